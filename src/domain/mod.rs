pub mod article;
pub mod bookmark;

pub use article::{Article, CachedArticle, ValidationError};
pub use bookmark::BookmarkRecord;
