pub mod annotation;
pub mod row_data;

pub use annotation::Annotation;
pub use row_data::RowData;
