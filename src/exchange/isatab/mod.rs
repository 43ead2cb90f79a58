//! ISA-Tab (Investigation / Study / Assay) archives
//!
//! Single-study phenotyping archives: one investigation file, one study
//! file, one assay file, a trait definition file and a derived data matrix.

pub mod export;
pub mod import;
pub mod layout;

pub use export::IsaTabExporter;
pub use import::{
    import_isatab, import_isatab_bytes, import_isatab_bytes_in, import_isatab_in, import_isatab_with,
};
