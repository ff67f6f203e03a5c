pub mod etl;
pub mod extract;
pub mod load;
pub mod transform;

pub use crate::domain::model::{Cell, QueryResult, RecordSet, ReferenceRateTable};
pub use crate::domain::ports::{PageFetcher, Pipeline, ProgressLog, SourceAdapter, Storage, TableStore};
pub use crate::utils::error::Result;
