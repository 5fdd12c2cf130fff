use crate::{
    api::{ActionKind, CommentId, PostId},
    Error,
};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EntityId {
    Post(PostId),
    Comment(CommentId),
}

/// State reached once the service confirmed an action.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NewState {
    Liked(bool),
    Saved(bool),
    Shares(u64),
    Reported,
    Created {
        provisional: CommentId,
        id: CommentId,
    },
    Edited,
    Deleted,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Confirmed(NewState),
    /// The optimistic mutation was undone before this was emitted.
    RolledBack(Error),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FeedEvent {
    pub kind: ActionKind,
    pub entity: EntityId,
    pub outcome: Outcome,
}

impl FeedEvent {
    pub fn confirmed(kind: ActionKind, entity: EntityId, state: NewState) -> FeedEvent {
        FeedEvent {
            kind,
            entity,
            outcome: Outcome::Confirmed(state),
        }
    }

    pub fn rolled_back(kind: ActionKind, entity: EntityId, err: Error) -> FeedEvent {
        FeedEvent {
            kind,
            entity,
            outcome: Outcome::RolledBack(err),
        }
    }

    pub fn is_rollback(&self) -> bool {
        matches!(self.outcome, Outcome::RolledBack(_))
    }
}
