pub mod policy;

pub use policy::{Action, FieldSet, Permission, Role};
