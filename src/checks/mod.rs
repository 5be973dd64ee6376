// src/checks/mod.rs

//! File-tree checks and fixups run around relocation
//!
//! - [`hardlinks`]: break shared inodes between packaged files
//! - [`shebang`]: rewrite build-prefix interpreter lines
//! - [`symlinks`]: reject links into the discarded build area
//! - [`metadata`]: declared vs. installed dist-info version
//! - [`menu`]: installer menu descriptor validation

pub mod hardlinks;
pub mod menu;
pub mod metadata;
pub mod shebang;
pub mod symlinks;

pub use hardlinks::break_hardlinks;
pub use menu::validate_menus;
pub use metadata::check_version;
pub use shebang::{fix_shebang, ShebangFix, ShebangFixer};
pub use symlinks::{check_symlinks, SymlinkEntry};
