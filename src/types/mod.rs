pub mod crm;
pub mod file_field;
pub mod report;
pub mod response;

pub use crm::CrmRecord;
pub use file_field::{FieldName, FileFieldValue, PermanentFile, ReferenceClassification};
pub use report::{SweepErrorEntry, SweepReport};
