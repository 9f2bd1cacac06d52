// Crate root: declare modules and control visibility
pub mod addr_table;
pub mod debug;
pub mod dwarf;
pub mod errors;
pub mod expr;
pub mod field_path;
pub mod locate;
pub mod memory;
pub mod session;
pub mod symbols;

// Re-export commonly used API from the library for binaries/tests
pub use addr_table::{AddressTable, DEFAULT_HEADER_SIZE};
pub use dwarf::{DebugInfoSource, DieRef, DwarfInfo};
pub use errors::ResolveError;
pub use field_path::{FieldResolver, QualifiedPath, DEFAULT_MAX_DEPTH};
pub use locate::{FieldMatch, LocateOptions, Locator, Outcome, TargetMode};
pub use memory::SectionCatalog;
pub use session::{run, Report};
