//! Page layouts: typed views over a raw [`Page`](crate::storage::page::Page)
//! buffer, one per page type in spec §3. Nothing here owns a file or a
//! cache frame; these are interpretations of bytes someone else fetched.

pub mod container_meta;
pub mod free_space_map;
pub mod index_page;
pub mod table_data;
pub mod table_header;

pub use container_meta::ContainerMetadataPage;
pub use free_space_map::FreeSpaceMapPage;
pub use index_page::{IndexHeaderPage, IndexNodePage, KeyValue};
pub use table_data::TableDataPage;
pub use table_header::{ColumnDef, TableHeaderPage};

use crate::common::{header, PageType};
use crate::error::Result;
use crate::storage::page::Page;

/// Read the page-type tag without constructing a typed view, for code that
/// needs to dispatch (catalog bootstrap scanning every page in a tablespace).
pub fn page_type_of(page: &Page) -> Result<PageType> {
    header::page_type(page.data())
}
