use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    future::Future,
    rc::Rc,
};

use crate::{
    api::{self, ActionKind, AuthToken, PostId, PostService, UserId},
    post::Flag,
    EntityId, Error, FeedEvent, NewState, Post, Session,
};

/// At most one confirmation may be in flight per key. Shares carry no user.
type ActionKey = (PostId, ActionKind, Option<UserId>);

#[derive(Clone, Copy, Debug)]
enum Previous {
    Flag {
        flag: Flag,
        user: UserId,
        was_set: bool,
    },
    Shared,
}

/// One optimistic post mutation awaiting confirmation, with what is needed to
/// undo it.
#[derive(Clone, Debug)]
struct Transaction {
    post: PostId,
    kind: ActionKind,
    user: Option<UserId>,
    previous: Previous,
    applied: NewState,
}

impl Transaction {
    fn key(&self) -> ActionKey {
        (self.post, self.kind, self.user)
    }

    // Restores only what this transaction touched, so it stays exact whatever
    // else happened to the post meanwhile.
    fn rollback(&self, post: &mut Post) {
        match self.previous {
            Previous::Flag {
                flag,
                user,
                was_set,
            } => post.set_flag(flag, user, was_set),
            Previous::Shared => post.share_count = post.share_count.saturating_sub(1),
        }
    }
}

#[derive(Default)]
struct StoreState {
    posts: HashMap<PostId, Post>,
    in_flight: HashSet<ActionKey>,
}

impl StoreState {
    fn settle(&mut self, tx: Transaction, res: Result<(), Error>) -> FeedEvent {
        self.in_flight.remove(&tx.key());
        let entity = EntityId::Post(tx.post);
        let res = match res {
            // The service already has this report, which is what we wanted
            Err(Error::AlreadyReported) if tx.kind == ActionKind::Report => Ok(()),
            res => res,
        };
        match res {
            Ok(()) => {
                let state = match (&tx.applied, self.posts.get(&tx.post)) {
                    (NewState::Shares(_), Some(p)) => NewState::Shares(p.share_count),
                    (applied, _) => applied.clone(),
                };
                tracing::info!(post = ?tx.post, kind = %tx.kind, "action confirmed");
                FeedEvent::confirmed(tx.kind, entity, state)
            }
            Err(err) => {
                match self.posts.get_mut(&tx.post) {
                    Some(p) => tx.rollback(p),
                    None => tracing::trace!(post = ?tx.post, "post gone before rollback"),
                }
                tracing::warn!(post = ?tx.post, kind = %tx.kind, %err, "rolled back action");
                FeedEvent::rolled_back(tx.kind, entity, err)
            }
        }
    }
}

/// Optimistic likes, saves, shares and reports for the posts of one feed.
///
/// Every operation mutates local state synchronously, then spawns a single
/// confirmation request. A failed confirmation undoes exactly the mutation
/// it belonged to and emits a rollback event. A second action with the same
/// post, kind and user while one is in flight is rejected with
/// `Error::ConcurrentActionInProgress`.
pub struct InteractionStore {
    session: Session,
    state: Rc<RefCell<StoreState>>,
}

impl InteractionStore {
    pub fn new(session: Session) -> InteractionStore {
        InteractionStore {
            session,
            state: Rc::new(RefCell::new(StoreState::default())),
        }
    }

    pub fn with_posts(session: Session, posts: Vec<api::Post>) -> InteractionStore {
        let this = InteractionStore::new(session);
        for p in posts {
            this.upsert_post(p);
        }
        this
    }

    /// Replaces a post with a freshly fetched copy. Actions in flight for it
    /// still roll back against the new copy.
    pub fn upsert_post(&self, post: api::Post) {
        self.state
            .borrow_mut()
            .posts
            .insert(post.id, Post::from(post));
    }

    pub fn post(&self, post: &PostId) -> Option<Post> {
        self.state.borrow().posts.get(post).cloned()
    }

    pub fn is_in_flight(&self, post: PostId, kind: ActionKind, user: Option<UserId>) -> bool {
        self.state.borrow().in_flight.contains(&(post, kind, user))
    }

    /// Returns whether `user` now likes the post.
    pub fn toggle_like(&self, post: PostId, user: Option<UserId>) -> Result<bool, Error> {
        let user = user.ok_or(Error::Unauthenticated)?;
        let (tx, now_liked) = self.toggle_flag(
            post,
            user,
            Flag::Liked,
            ActionKind::Like,
            NewState::Liked,
        )?;
        let request = self.request(move |posts, tok| async move {
            match now_liked {
                true => posts.like(&tok, post).await,
                false => posts.unlike(&tok, post).await,
            }
        });
        self.confirm(tx, request);
        Ok(now_liked)
    }

    /// Returns whether `user` now has the post saved.
    pub fn toggle_save(&self, post: PostId, user: Option<UserId>) -> Result<bool, Error> {
        let user = user.ok_or(Error::Unauthenticated)?;
        let (tx, now_saved) = self.toggle_flag(
            post,
            user,
            Flag::Saved,
            ActionKind::Save,
            NewState::Saved,
        )?;
        let request = self.request(move |posts, tok| async move {
            match now_saved {
                true => posts.save(&tok, post).await,
                false => posts.unsave(&tok, post).await,
            }
        });
        self.confirm(tx, request);
        Ok(now_saved)
    }

    /// Returns the share count including this share.
    pub fn increment_share(&self, post: PostId) -> Result<u64, Error> {
        let mut shares = 0;
        let tx = self.begin(post, ActionKind::Share, None, |p| {
            p.share_count = p.share_count.saturating_add(1);
            shares = p.share_count;
            (Previous::Shared, NewState::Shares(shares))
        })?;
        let request =
            self.request(move |posts, tok| async move { posts.share(&tok, post).await });
        self.confirm(tx, request);
        Ok(shares)
    }

    /// Reports are not revocable: once confirmed, the membership stays. A
    /// failed report is rolled back so it can be retried.
    pub fn report_once(
        &self,
        post: PostId,
        user: Option<UserId>,
        reason: Option<String>,
    ) -> Result<(), Error> {
        let user = user.ok_or(Error::Unauthenticated)?;
        {
            let state = self.state.borrow();
            let p = state.posts.get(&post).ok_or(Error::NotFound)?;
            if p.is_reported_by(&user) {
                tracing::debug!(?post, "post already reported, not contacting service");
                return Err(Error::AlreadyReported);
            }
        }
        let tx = self.begin(post, ActionKind::Report, Some(user), |p| {
            p.set_flag(Flag::Reported, user, true);
            let previous = Previous::Flag {
                flag: Flag::Reported,
                user,
                was_set: false,
            };
            (previous, NewState::Reported)
        })?;
        let request = self.request(move |posts, tok| async move {
            posts.report(&tok, post, reason).await
        });
        self.confirm(tx, request);
        Ok(())
    }

    fn toggle_flag(
        &self,
        post: PostId,
        user: UserId,
        flag: Flag,
        kind: ActionKind,
        applied: fn(bool) -> NewState,
    ) -> Result<(Transaction, bool), Error> {
        let mut now_set = false;
        let tx = self.begin(post, kind, Some(user), |p| {
            let was_set = p.has_flag(flag, &user);
            now_set = !was_set;
            p.set_flag(flag, user, now_set);
            let previous = Previous::Flag {
                flag,
                user,
                was_set,
            };
            (previous, applied(now_set))
        })?;
        Ok((tx, now_set))
    }

    fn begin(
        &self,
        post: PostId,
        kind: ActionKind,
        user: Option<UserId>,
        apply: impl FnOnce(&mut Post) -> (Previous, NewState),
    ) -> Result<Transaction, Error> {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        let p = state.posts.get_mut(&post).ok_or(Error::NotFound)?;
        let key = (post, kind, user);
        if state.in_flight.contains(&key) {
            return Err(Error::ConcurrentActionInProgress);
        }
        let (previous, applied) = apply(p);
        state.in_flight.insert(key);
        tracing::debug!(?post, %kind, ?applied, "applied optimistic action");
        Ok(Transaction {
            post,
            kind,
            user,
            previous,
            applied,
        })
    }

    fn request<F, Fut>(&self, call: F) -> impl Future<Output = Result<(), Error>> + 'static
    where
        F: FnOnce(Rc<dyn PostService>, AuthToken) -> Fut + 'static,
        Fut: Future<Output = Result<(), api::Error>> + 'static,
    {
        let auth = self.session.auth.clone();
        let posts = self.session.posts.clone();
        async move {
            let tok = auth.token().await?;
            call(posts, tok).await?;
            Ok(())
        }
    }

    fn confirm(&self, tx: Transaction, request: impl Future<Output = Result<(), Error>> + 'static) {
        self.session
            .confirm(&self.state, request, move |state: &mut StoreState, res| {
                state.settle(tx, res)
            });
    }
}
