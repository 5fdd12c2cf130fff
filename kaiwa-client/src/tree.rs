use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    future::Future,
    rc::Rc,
};

use chrono::Utc;

use crate::{
    api::{
        self, ActionKind, AuthToken, CommentId, CommentService, CreatedComment, PostId, Time,
        UserId,
    },
    error::validate_text,
    forest::Detached,
    perms, Comment, CommentPerms, EntityId, Error, FeedEvent, Forest, NewState, Session,
};

/// Owned copy of a comment and everything below it, for rendering.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ThreadNode {
    pub comment: Comment,
    pub reply_count: usize,
    pub replies: Vec<ThreadNode>,
}

impl ThreadNode {
    fn build(forest: &Forest, id: &CommentId) -> Option<ThreadNode> {
        let comment = forest.get(id)?.clone();
        let replies = forest
            .children(id)
            .iter()
            .filter_map(|c| ThreadNode::build(forest, c))
            .collect::<Vec<_>>();
        let reply_count = replies.iter().map(|r| 1 + r.reply_count).sum();
        Some(ThreadNode {
            comment,
            reply_count,
            replies,
        })
    }
}

struct TreeState {
    forest: Forest,
    in_flight: HashSet<(CommentId, ActionKind)>,

    /// Deletions awaiting confirmation, with the parent they were cut from
    deleting: HashMap<CommentId, Option<CommentId>>,

    collapsed: HashSet<CommentId>,
}

impl TreeState {
    fn settle_reply(
        &mut self,
        provisional: CommentId,
        res: Result<CreatedComment, Error>,
    ) -> FeedEvent {
        match res {
            Ok(created) => {
                if self.forest.rekey(&provisional, created.id) {
                    if let Some(c) = self.forest.get_mut(&created.id) {
                        c.created_at = created.created_at;
                        c.confirmed = true;
                    }
                    if self.collapsed.remove(&provisional) {
                        self.collapsed.insert(created.id);
                    }
                } else if self.forest.detach(&provisional).is_some() {
                    // The durable comment already reached us some other way
                    self.collapsed.remove(&provisional);
                } else {
                    tracing::trace!(comment = ?provisional, "reply gone before confirmation");
                }
                tracing::info!(?provisional, id = ?created.id, "reply confirmed");
                FeedEvent::confirmed(
                    ActionKind::Reply,
                    EntityId::Comment(created.id),
                    NewState::Created {
                        provisional,
                        id: created.id,
                    },
                )
            }
            Err(err) => {
                self.forest.detach(&provisional);
                self.collapsed.remove(&provisional);
                tracing::warn!(comment = ?provisional, %err, "rolled back reply");
                FeedEvent::rolled_back(ActionKind::Reply, EntityId::Comment(provisional), err)
            }
        }
    }

    fn settle_edit(
        &mut self,
        id: CommentId,
        previous: (String, Option<Time>),
        res: Result<(), Error>,
    ) -> FeedEvent {
        self.in_flight.remove(&(id, ActionKind::Edit));
        let entity = EntityId::Comment(id);
        match res {
            Ok(()) => FeedEvent::confirmed(ActionKind::Edit, entity, NewState::Edited),
            Err(err) => {
                match self.forest.get_mut(&id) {
                    Some(c) => {
                        c.text = previous.0;
                        c.edited_at = previous.1;
                    }
                    None => tracing::trace!(comment = ?id, "comment gone before rollback"),
                }
                tracing::warn!(comment = ?id, %err, "rolled back edit");
                FeedEvent::rolled_back(ActionKind::Edit, entity, err)
            }
        }
    }

    fn settle_delete(&mut self, detached: Detached, res: Result<(), Error>) -> FeedEvent {
        let id = detached.root();
        self.deleting.remove(&id);
        let entity = EntityId::Comment(id);
        match res {
            Ok(()) => {
                for c in detached.ids() {
                    self.collapsed.remove(&c);
                }
                tracing::info!(comment = ?id, removed = detached.len(), "deletion confirmed");
                FeedEvent::confirmed(ActionKind::Delete, entity, NewState::Deleted)
            }
            Err(err) => {
                if let Err(d) = self.forest.reattach(detached) {
                    tracing::warn!(
                        comment = ?id,
                        parent = ?d.parent(),
                        "parent of comment gone, cannot restore it"
                    );
                }
                tracing::warn!(comment = ?id, %err, "rolled back deletion");
                FeedEvent::rolled_back(ActionKind::Delete, entity, err)
            }
        }
    }

    fn settle_like(
        &mut self,
        id: CommentId,
        user: UserId,
        now_liked: bool,
        res: Result<(), Error>,
    ) -> FeedEvent {
        self.in_flight.remove(&(id, ActionKind::LikeComment));
        let entity = EntityId::Comment(id);
        match res {
            Ok(()) => {
                FeedEvent::confirmed(ActionKind::LikeComment, entity, NewState::Liked(now_liked))
            }
            Err(err) => {
                if let Some(c) = self.forest.get_mut(&id) {
                    match now_liked {
                        true => c.liked_by.remove(&user),
                        false => c.liked_by.insert(user),
                    };
                }
                tracing::warn!(comment = ?id, %err, "rolled back comment like");
                FeedEvent::rolled_back(ActionKind::LikeComment, entity, err)
            }
        }
    }
}

/// Reply forest of one post, with optimistic replies, edits, deletions and
/// likes.
///
/// Replies are inserted under a provisional id that gets replaced by the
/// durable one on confirmation. Deleting a comment removes its whole subtree.
/// Comments whose creation is not confirmed yet cannot be acted upon, and
/// neither can a comment with an edit or like of the same kind in flight:
/// both fail with `Error::ConcurrentActionInProgress`. A subtree is only
/// deleted once nothing below its root awaits confirmation.
pub struct CommentTree {
    session: Session,
    post_id: PostId,
    post_owner: UserId,
    state: Rc<RefCell<TreeState>>,
}

impl CommentTree {
    pub fn new(session: Session, post_id: PostId, post_owner: UserId) -> CommentTree {
        CommentTree::with_forest(session, post_id, post_owner, Forest::new())
    }

    pub fn from_fetched(
        session: Session,
        post_id: PostId,
        post_owner: UserId,
        comments: Vec<api::Comment>,
    ) -> CommentTree {
        let comments = comments
            .into_iter()
            .filter(|c| c.post_id == post_id)
            .collect();
        CommentTree::with_forest(session, post_id, post_owner, Forest::from_fetched(comments))
    }

    fn with_forest(
        session: Session,
        post_id: PostId,
        post_owner: UserId,
        forest: Forest,
    ) -> CommentTree {
        CommentTree {
            session,
            post_id,
            post_owner,
            state: Rc::new(RefCell::new(TreeState {
                forest,
                in_flight: HashSet::new(),
                deleting: HashMap::new(),
                collapsed: HashSet::new(),
            })),
        }
    }

    pub fn post_id(&self) -> PostId {
        self.post_id
    }

    pub fn post_owner(&self) -> UserId {
        self.post_owner
    }

    pub fn len(&self) -> usize {
        self.state.borrow().forest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().forest.is_empty()
    }

    pub fn comment(&self, id: &CommentId) -> Option<Comment> {
        self.state.borrow().forest.get(id).cloned()
    }

    pub fn roots(&self) -> Vec<CommentId> {
        self.state.borrow().forest.roots().to_vec()
    }

    pub fn children(&self, id: &CommentId) -> Vec<CommentId> {
        self.state.borrow().forest.children(id).to_vec()
    }

    /// Number of replies below `id`, at any depth.
    pub fn reply_count(&self, id: &CommentId) -> Result<usize, Error> {
        self.state
            .borrow()
            .forest
            .reply_count(id)
            .ok_or(Error::NotFound)
    }

    pub fn snapshot(&self) -> Vec<ThreadNode> {
        let state = self.state.borrow();
        state
            .forest
            .roots()
            .iter()
            .filter_map(|r| ThreadNode::build(&state.forest, r))
            .collect()
    }

    pub fn perms(&self, id: &CommentId, user: Option<UserId>) -> Option<CommentPerms> {
        let state = self.state.borrow();
        let c = state.forest.get(id)?;
        Some(CommentPerms::for_user(c, user.as_ref(), &self.post_owner))
    }

    pub fn can_edit(&self, id: &CommentId, user: Option<UserId>) -> bool {
        self.perms(id, user).map(|p| p.can_edit).unwrap_or(false)
    }

    pub fn can_delete(&self, id: &CommentId, user: Option<UserId>) -> bool {
        self.perms(id, user).map(|p| p.can_delete).unwrap_or(false)
    }

    /// Whether the comment's creation is still awaiting confirmation
    pub fn is_pending(&self, id: &CommentId) -> bool {
        self.state
            .borrow()
            .forest
            .get(id)
            .map(|c| !c.confirmed)
            .unwrap_or(false)
    }

    /// Returns whether the comment is now collapsed.
    pub fn toggle_collapsed(&self, id: &CommentId) -> Result<bool, Error> {
        let mut state = self.state.borrow_mut();
        if !state.forest.contains(id) {
            return Err(Error::NotFound);
        }
        if state.collapsed.remove(id) {
            Ok(false)
        } else {
            state.collapsed.insert(*id);
            Ok(true)
        }
    }

    pub fn is_collapsed(&self, id: &CommentId) -> bool {
        self.state.borrow().collapsed.contains(id)
    }

    /// Comments to display, in thread order with their depth, hiding the
    /// replies of collapsed comments.
    pub fn visible(&self) -> Vec<(usize, CommentId)> {
        let state = self.state.borrow();
        state.forest.walk(|c| state.collapsed.contains(c))
    }

    /// Adds a comment, top-level if `parent` is `None`, and returns its
    /// provisional id.
    pub fn add_reply(
        &self,
        parent: Option<CommentId>,
        text: &str,
        author: Option<UserId>,
    ) -> Result<CommentId, Error> {
        self.add_reply_as(CommentId::new_v4(), parent, text, author)
    }

    fn add_reply_as(
        &self,
        provisional: CommentId,
        parent: Option<CommentId>,
        text: &str,
        author: Option<UserId>,
    ) -> Result<CommentId, Error> {
        let author = author.ok_or(Error::Unauthenticated)?;
        let text = {
            let mut state = self.state.borrow_mut();
            if let Some(p) = &parent {
                let parent = state.forest.get(p).ok_or(Error::ParentNotFound)?;
                if !parent.confirmed {
                    return Err(Error::ConcurrentActionInProgress);
                }
            }
            let text = validate_text(text)?.to_string();
            let inserted = state.forest.insert(Comment {
                id: provisional,
                parent_id: parent,
                author_id: author,
                text: text.clone(),
                created_at: Utc::now(),
                edited_at: None,
                liked_by: HashSet::new(),
                confirmed: false,
            })?;
            if !inserted {
                // Settling would then rekey or drop the comment already there
                tracing::error!(?provisional, "provisional id already in use");
                return Err(Error::ConcurrentActionInProgress);
            }
            text
        };
        tracing::debug!(?provisional, ?parent, "inserted provisional reply");
        let post = self.post_id;
        let request = self.request(move |comments, tok| async move {
            comments.create(&tok, post, parent, text).await
        });
        self.session
            .confirm(&self.state, request, move |state: &mut TreeState, res| {
                state.settle_reply(provisional, res)
            });
        Ok(provisional)
    }

    /// Replaces the text of a comment by `text` with surrounding whitespace
    /// trimmed, which is also what gets sent to the service. Returns `false`
    /// without contacting the service if the trimmed text is identical to the
    /// current one.
    pub fn edit_text(
        &self,
        id: CommentId,
        text: &str,
        user: Option<UserId>,
    ) -> Result<bool, Error> {
        let user = user.ok_or(Error::Unauthenticated)?;
        let (text, previous) = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            let c = state.forest.get(&id).ok_or(Error::NotFound)?;
            if !CommentPerms::for_user(c, Some(&user), &self.post_owner).can_edit {
                return Err(Error::Forbidden);
            }
            if !c.confirmed || state.in_flight.contains(&(id, ActionKind::Edit)) {
                return Err(Error::ConcurrentActionInProgress);
            }
            let text = validate_text(text)?;
            if text == c.text {
                tracing::debug!(comment = ?id, "edit does not change text, ignoring");
                return Ok(false);
            }
            let c = state.forest.get_mut(&id).ok_or(Error::NotFound)?;
            let previous = (
                std::mem::replace(&mut c.text, text.to_string()),
                std::mem::replace(&mut c.edited_at, Some(Utc::now())),
            );
            state.in_flight.insert((id, ActionKind::Edit));
            (text.to_string(), previous)
        };
        tracing::debug!(comment = ?id, "applied optimistic edit");
        let request = self.request(move |comments, tok| async move {
            comments.edit(&tok, id, text).await
        });
        self.session
            .confirm(&self.state, request, move |state: &mut TreeState, res| {
                state.settle_edit(id, previous, res)
            });
        Ok(true)
    }

    /// Removes the comment and all its replies, returning how many comments
    /// were removed.
    pub fn delete_node(&self, id: CommentId, user: Option<UserId>) -> Result<usize, Error> {
        let user = user.ok_or(Error::Unauthenticated)?;
        let detached = {
            let mut state = self.state.borrow_mut();
            let c = state.forest.get(&id).ok_or(Error::NotFound)?;
            if !perms::can_act(c, &user, &self.post_owner) {
                return Err(Error::Forbidden);
            }
            let mut subtree = state
                .forest
                .descendants(&id)
                .into_iter()
                .collect::<HashSet<_>>();
            subtree.insert(id);
            let has_pending = subtree.iter().any(|s| {
                state
                    .forest
                    .get(s)
                    .map(|c| !c.confirmed)
                    .unwrap_or(false)
            });
            // Edits and likes roll back in place, so the node must still be there
            let has_action_below = state.in_flight.iter().any(|(c, _)| subtree.contains(c));
            // A deletion below this comment could not be restored if this one went through
            let has_deletion_below = state
                .deleting
                .values()
                .any(|p| p.map(|p| subtree.contains(&p)).unwrap_or(false));
            if has_pending || has_action_below || has_deletion_below {
                return Err(Error::ConcurrentActionInProgress);
            }
            let detached = state.forest.detach(&id).ok_or(Error::NotFound)?;
            state.deleting.insert(id, detached.parent());
            detached
        };
        let removed = detached.len();
        tracing::debug!(comment = ?id, removed, "applied optimistic deletion");
        let request =
            self.request(move |comments, tok| async move { comments.delete(&tok, id).await });
        self.session
            .confirm(&self.state, request, move |state: &mut TreeState, res| {
                state.settle_delete(detached, res)
            });
        Ok(removed)
    }

    /// Returns whether `user` now likes the comment.
    pub fn toggle_like(&self, id: CommentId, user: Option<UserId>) -> Result<bool, Error> {
        let user = user.ok_or(Error::Unauthenticated)?;
        let now_liked = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            let c = state.forest.get_mut(&id).ok_or(Error::NotFound)?;
            if !c.confirmed || state.in_flight.contains(&(id, ActionKind::LikeComment)) {
                return Err(Error::ConcurrentActionInProgress);
            }
            let now_liked = !c.liked_by.contains(&user);
            match now_liked {
                true => c.liked_by.insert(user),
                false => c.liked_by.remove(&user),
            };
            state.in_flight.insert((id, ActionKind::LikeComment));
            now_liked
        };
        tracing::debug!(comment = ?id, now_liked, "applied optimistic comment like");
        let request = self.request(move |comments, tok| async move {
            match now_liked {
                true => comments.like(&tok, id).await,
                false => comments.unlike(&tok, id).await,
            }
        });
        self.session
            .confirm(&self.state, request, move |state: &mut TreeState, res| {
                state.settle_like(id, user, now_liked, res)
            });
        Ok(now_liked)
    }

    fn request<T, F, Fut>(&self, call: F) -> impl Future<Output = Result<T, Error>> + 'static
    where
        T: 'static,
        F: FnOnce(Rc<dyn CommentService>, AuthToken) -> Fut + 'static,
        Fut: Future<Output = Result<T, api::Error>> + 'static,
    {
        let auth = self.session.auth.clone();
        let comments = self.session.comments.clone();
        async move {
            let tok = auth.token().await?;
            Ok(call(comments, tok).await?)
        }
    }
}
