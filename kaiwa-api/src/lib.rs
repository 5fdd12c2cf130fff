use chrono::Utc;

pub use uuid::{uuid, Uuid};

mod action;
pub use action::ActionKind;

mod auth;
pub use auth::{AuthProvider, AuthToken};

mod comment;
pub use comment::{Comment, CommentId, CreatedComment};

mod error;
pub use error::Error;

mod post;
pub use post::{Post, PostId};

mod service;
pub use service::{CommentService, PostService};

mod user;
pub use user::{User, UserId};

pub type Time = chrono::DateTime<Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

/// Everything a client needs to display one feed: the posts and the flat
/// list of all comments on them.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Feed {
    pub users: Vec<User>,
    pub posts: Vec<Post>,
    pub comments: Vec<Comment>,
}

impl Feed {
    pub fn comments_for(&self, post: PostId) -> Vec<Comment> {
        self.comments
            .iter()
            .filter(|c| c.post_id == post)
            .cloned()
            .collect()
    }
}

// Null bytes are not representable by the service's storage
pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}

/// Validates user-authored text, returning its trimmed form.
pub fn validate_text(s: &str) -> Result<&str, Error> {
    validate_string(s)?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyText);
    }
    Ok(trimmed)
}
