use uuid::Uuid;

use crate::{PostId, Time, UserId};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

impl CommentId {
    pub fn new_v4() -> CommentId {
        CommentId(Uuid::new_v4())
    }
}

/// A comment as fetched from the service: replies are linked to their
/// parent by id rather than nested.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub parent_id: Option<CommentId>,
    pub author_id: UserId,
    pub text: String,
    pub created_at: Time,
    pub edited_at: Option<Time>,
    pub liked_by: Vec<UserId>,
}

/// Server answer to a comment creation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CreatedComment {
    pub id: CommentId,
    pub created_at: Time,
}
