// Adapters layer: source parsers and concrete implementations of the domain ports.

pub mod delimited;
pub mod html_table;
pub mod http;
pub mod markup;
pub mod progress_log;
pub mod sqlite;
pub mod storage;
pub mod structured;

pub use delimited::DelimitedTextAdapter;
pub use html_table::{ColumnSelection, HtmlTableAdapter};
pub use http::HttpFetcher;
pub use markup::HierarchicalMarkupAdapter;
pub use progress_log::FileProgressLog;
pub use sqlite::SqliteStore;
pub use storage::LocalStorage;
pub use structured::StructuredObjectAdapter;
