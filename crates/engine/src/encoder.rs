//! The external SPLADE encoder collaborator (spec section 6). Recollex is
//! agnostic to how text becomes a sparse vector; callers plug in whatever
//! model produced `dims` and stamp it into the manifest on first write.

/// Encodes text into sparse `(term_ids, weights)` pairs.
///
/// Implementations must return term ids in strictly ascending order with
/// non-negative weights; `dims` is the encoder's fixed vocabulary size.
pub trait Encoder {
    /// The encoder's fixed vocabulary size, stamped into the manifest on the
    /// first segment write.
    fn dims(&self) -> u32;

    /// Encode a batch of texts into one sparse vector per input, in order.
    fn encode(&self, texts: &[&str]) -> Vec<(Vec<u32>, Vec<f32>)>;
}
