pub mod input;
pub mod output;

pub use input::read_annotations_csv;
pub use output::write_annotations_csv;
