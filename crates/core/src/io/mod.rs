pub mod face_crop_writer;
pub mod image_file_reader;
pub mod image_reader;
pub mod overlay_writer;
