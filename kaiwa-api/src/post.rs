use uuid::Uuid;

use crate::{Time, UserId, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct PostId(pub Uuid);

impl PostId {
    pub fn stub() -> PostId {
        PostId(STUB_UUID)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub date: Time,
    pub text: String,

    pub liked_by: Vec<UserId>,
    pub saved_by: Vec<UserId>,
    pub share_count: u64,
    pub reported_by: Vec<UserId>,
}
