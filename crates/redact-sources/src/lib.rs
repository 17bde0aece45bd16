pub mod dfxml;
pub mod digest;
pub mod ignore;
pub mod walker;

pub use dfxml::DfxmlWalker;
pub use ignore::IgnoreFilter;
pub use walker::{FileWalker, HashPlan, StaticWalker, WalkOptions};
