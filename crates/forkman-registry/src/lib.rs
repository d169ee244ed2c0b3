mod metadata;
mod registry;

pub use metadata::{read_metadata, write_metadata, VariantMetadata};
pub use registry::{Variant, VariantRegistry};

#[cfg(test)]
mod tests;
