use async_trait::async_trait;

use crate::{AuthToken, CommentId, CreatedComment, Error, PostId};

/// Remote post interactions. Each call either succeeds or fails once; the
/// client never retries on its own.
#[async_trait(?Send)]
pub trait PostService {
    async fn like(&self, tok: &AuthToken, post: PostId) -> Result<(), Error>;
    async fn unlike(&self, tok: &AuthToken, post: PostId) -> Result<(), Error>;
    async fn save(&self, tok: &AuthToken, post: PostId) -> Result<(), Error>;
    async fn unsave(&self, tok: &AuthToken, post: PostId) -> Result<(), Error>;
    async fn share(&self, tok: &AuthToken, post: PostId) -> Result<(), Error>;
    /// May fail with `Error::AlreadyReported`.
    async fn report(
        &self,
        tok: &AuthToken,
        post: PostId,
        reason: Option<String>,
    ) -> Result<(), Error>;
}

#[async_trait(?Send)]
pub trait CommentService {
    async fn create(
        &self,
        tok: &AuthToken,
        post: PostId,
        parent: Option<CommentId>,
        text: String,
    ) -> Result<CreatedComment, Error>;
    async fn edit(&self, tok: &AuthToken, comment: CommentId, text: String) -> Result<(), Error>;
    async fn delete(&self, tok: &AuthToken, comment: CommentId) -> Result<(), Error>;
    async fn like(&self, tok: &AuthToken, comment: CommentId) -> Result<(), Error>;
    async fn unlike(&self, tok: &AuthToken, comment: CommentId) -> Result<(), Error>;
}
