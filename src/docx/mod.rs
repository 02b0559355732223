pub mod comments;
pub mod package;
pub mod rels;
pub mod text;
pub mod tree;
pub mod verify;
pub mod wml;
pub mod xml;
