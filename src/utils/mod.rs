/// Utility modules
pub mod affine_transform;
