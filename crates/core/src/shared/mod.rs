pub mod bounding_box;
pub mod constants;
pub mod image_tensor;
pub mod model_resolver;
