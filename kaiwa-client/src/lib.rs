mod error;
pub use error::Error;

mod event;
pub use event::{EntityId, FeedEvent, NewState, Outcome};

mod forest;
pub use forest::{Comment, Detached, Forest};

mod interaction;
pub use interaction::InteractionStore;

mod perms;
pub use perms::{can_act, CommentPerms};

mod post;
pub use post::Post;

mod session;
pub use session::{EventReceiver, Session, Spawner};

mod tree;
pub use tree::{CommentTree, ThreadNode};

#[cfg(test)]
mod fuzz;
#[cfg(test)]
mod testing;

pub mod api {
    pub use kaiwa_api::*;
}
