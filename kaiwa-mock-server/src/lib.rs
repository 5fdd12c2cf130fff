use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap, VecDeque},
};

use async_trait::async_trait;
use chrono::Utc;
use kaiwa_api::{
    ActionKind, AuthProvider, AuthToken, Comment, CommentId, CommentService, CreatedComment, Error,
    Feed, Post, PostId, PostService, User, UserId, Uuid,
};

/// In-memory stand-in for the remote service, with failure injection.
pub struct MockServer(RefCell<State>);

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<UserId, DbUser>,
    posts: BTreeMap<PostId, Post>,
    comments: BTreeMap<CommentId, Comment>,
    reports: Vec<(PostId, UserId, Option<String>)>,

    /// Errors to answer the next calls of each kind with, in order
    failures: HashMap<ActionKind, VecDeque<Error>>,
    calls: HashMap<ActionKind, usize>,
}

#[derive(Debug)]
struct DbUser {
    name: String,
    sessions: Vec<AuthToken>,
}

impl State {
    fn resolve(&self, tok: &AuthToken) -> Result<UserId, Error> {
        for (id, u) in self.users.iter() {
            if u.sessions.contains(tok) {
                return Ok(*id);
            }
        }
        Err(Error::Unauthenticated)
    }

    /// Records the call, then answers with an injected failure if any, or
    /// with the calling user.
    fn enter(&mut self, kind: ActionKind, tok: &AuthToken) -> Result<UserId, Error> {
        *self.calls.entry(kind).or_insert(0) += 1;
        if let Some(err) = self.failures.get_mut(&kind).and_then(|f| f.pop_front()) {
            tracing::debug!(%kind, %err, "answering with injected failure");
            return Err(err);
        }
        self.resolve(tok)
    }

    fn post_mut(&mut self, post: &PostId) -> Result<&mut Post, Error> {
        self.posts.get_mut(post).ok_or(Error::NotFound)
    }

    fn set_membership(
        &mut self,
        kind: ActionKind,
        tok: &AuthToken,
        post: PostId,
        on: bool,
        set: fn(&mut Post) -> &mut Vec<UserId>,
    ) -> Result<(), Error> {
        let user = self.enter(kind, tok)?;
        let members = set(self.post_mut(&post)?);
        members.retain(|u| *u != user);
        if on {
            members.push(user);
        }
        Ok(())
    }

    fn comment_mut(&mut self, comment: &CommentId) -> Result<&mut Comment, Error> {
        self.comments.get_mut(comment).ok_or(Error::NotFound)
    }

    fn set_comment_like(
        &mut self,
        tok: &AuthToken,
        comment: CommentId,
        on: bool,
    ) -> Result<(), Error> {
        let user = self.enter(ActionKind::LikeComment, tok)?;
        let c = self.comment_mut(&comment)?;
        c.liked_by.retain(|u| *u != user);
        if on {
            c.liked_by.push(user);
        }
        Ok(())
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer(RefCell::new(State::default()))
    }

    pub fn from_feed(feed: Feed) -> MockServer {
        let this = MockServer::new();
        {
            let mut s = this.0.borrow_mut();
            for u in feed.users {
                s.users.insert(
                    u.id,
                    DbUser {
                        name: u.name,
                        sessions: Vec::new(),
                    },
                );
            }
            s.posts.extend(feed.posts.into_iter().map(|p| (p.id, p)));
            s.comments.extend(feed.comments.into_iter().map(|c| (c.id, c)));
        }
        this
    }

    pub fn auth(&self, user: UserId) -> Result<AuthToken, Error> {
        let mut s = self.0.borrow_mut();
        let u = s.users.get_mut(&user).ok_or(Error::PermissionDenied)?;
        let tok = AuthToken(Uuid::new_v4());
        u.sessions.push(tok);
        Ok(tok)
    }

    /// Makes the next call of `kind` fail with `err`. Calls queue up.
    pub fn fail_next(&self, kind: ActionKind, err: Error) {
        self.0
            .borrow_mut()
            .failures
            .entry(kind)
            .or_default()
            .push_back(err);
    }

    /// Number of calls of `kind` received so far, failed ones included.
    pub fn calls(&self, kind: ActionKind) -> usize {
        self.0.borrow().calls.get(&kind).copied().unwrap_or(0)
    }

    pub fn post(&self, post: &PostId) -> Option<Post> {
        self.0.borrow().posts.get(post).cloned()
    }

    pub fn comment(&self, comment: &CommentId) -> Option<Comment> {
        self.0.borrow().comments.get(comment).cloned()
    }

    pub fn reports(&self) -> Vec<(PostId, UserId, Option<String>)> {
        self.0.borrow().reports.clone()
    }

    /// Current state of everything, in the shape clients fetch it
    pub fn feed(&self) -> Feed {
        let s = self.0.borrow();
        Feed {
            users: s
                .users
                .iter()
                .map(|(id, u)| User {
                    id: *id,
                    name: u.name.clone(),
                })
                .collect(),
            posts: s.posts.values().cloned().collect(),
            comments: s.comments.values().cloned().collect(),
        }
    }
}

#[async_trait(?Send)]
impl PostService for MockServer {
    async fn like(&self, tok: &AuthToken, post: PostId) -> Result<(), Error> {
        self.0
            .borrow_mut()
            .set_membership(ActionKind::Like, tok, post, true, |p| &mut p.liked_by)
    }

    async fn unlike(&self, tok: &AuthToken, post: PostId) -> Result<(), Error> {
        self.0
            .borrow_mut()
            .set_membership(ActionKind::Like, tok, post, false, |p| &mut p.liked_by)
    }

    async fn save(&self, tok: &AuthToken, post: PostId) -> Result<(), Error> {
        self.0
            .borrow_mut()
            .set_membership(ActionKind::Save, tok, post, true, |p| &mut p.saved_by)
    }

    async fn unsave(&self, tok: &AuthToken, post: PostId) -> Result<(), Error> {
        self.0
            .borrow_mut()
            .set_membership(ActionKind::Save, tok, post, false, |p| &mut p.saved_by)
    }

    async fn share(&self, tok: &AuthToken, post: PostId) -> Result<(), Error> {
        let mut s = self.0.borrow_mut();
        s.enter(ActionKind::Share, tok)?;
        let p = s.post_mut(&post)?;
        p.share_count += 1;
        Ok(())
    }

    async fn report(
        &self,
        tok: &AuthToken,
        post: PostId,
        reason: Option<String>,
    ) -> Result<(), Error> {
        let mut s = self.0.borrow_mut();
        let user = s.enter(ActionKind::Report, tok)?;
        if let Some(reason) = &reason {
            kaiwa_api::validate_string(reason)?;
        }
        let p = s.post_mut(&post)?;
        if p.reported_by.contains(&user) {
            return Err(Error::AlreadyReported);
        }
        p.reported_by.push(user);
        s.reports.push((post, user, reason));
        Ok(())
    }
}

#[async_trait(?Send)]
impl CommentService for MockServer {
    async fn create(
        &self,
        tok: &AuthToken,
        post: PostId,
        parent: Option<CommentId>,
        text: String,
    ) -> Result<CreatedComment, Error> {
        let mut s = self.0.borrow_mut();
        let user = s.enter(ActionKind::Reply, tok)?;
        let text = kaiwa_api::validate_text(&text)?.to_string();
        if !s.posts.contains_key(&post) {
            return Err(Error::NotFound);
        }
        if let Some(p) = &parent {
            match s.comments.get(p) {
                Some(p) if p.post_id == post => (),
                _ => return Err(Error::NotFound),
            }
        }
        let created = CreatedComment {
            id: CommentId::new_v4(),
            created_at: Utc::now(),
        };
        s.comments.insert(
            created.id,
            Comment {
                id: created.id,
                post_id: post,
                parent_id: parent,
                author_id: user,
                text,
                created_at: created.created_at,
                edited_at: None,
                liked_by: Vec::new(),
            },
        );
        Ok(created)
    }

    async fn edit(&self, tok: &AuthToken, comment: CommentId, text: String) -> Result<(), Error> {
        let mut s = self.0.borrow_mut();
        let user = s.enter(ActionKind::Edit, tok)?;
        let text = kaiwa_api::validate_text(&text)?.to_string();
        let c = s.comment_mut(&comment)?;
        if c.author_id != user {
            return Err(Error::PermissionDenied);
        }
        c.text = text;
        c.edited_at = Some(Utc::now());
        Ok(())
    }

    async fn delete(&self, tok: &AuthToken, comment: CommentId) -> Result<(), Error> {
        let mut s = self.0.borrow_mut();
        let user = s.enter(ActionKind::Delete, tok)?;
        let c = s.comments.get(&comment).ok_or(Error::NotFound)?;
        let post_owner = s.posts.get(&c.post_id).map(|p| p.author_id);
        if c.author_id != user && post_owner != Some(user) {
            return Err(Error::PermissionDenied);
        }
        // Replies go along with the comment they answer
        let mut removed = vec![comment];
        while let Some(id) = removed.pop() {
            s.comments.remove(&id);
            removed.extend(
                s.comments
                    .values()
                    .filter(|c| c.parent_id == Some(id))
                    .map(|c| c.id),
            );
        }
        Ok(())
    }

    async fn like(&self, tok: &AuthToken, comment: CommentId) -> Result<(), Error> {
        self.0.borrow_mut().set_comment_like(tok, comment, true)
    }

    async fn unlike(&self, tok: &AuthToken, comment: CommentId) -> Result<(), Error> {
        self.0.borrow_mut().set_comment_like(tok, comment, false)
    }
}

/// Token source holding at most one session.
#[derive(Debug, Default)]
pub struct MockAuth(RefCell<Option<AuthToken>>);

impl MockAuth {
    pub fn new(tok: Option<AuthToken>) -> MockAuth {
        MockAuth(RefCell::new(tok))
    }

    pub fn set(&self, tok: Option<AuthToken>) {
        *self.0.borrow_mut() = tok;
    }
}

#[async_trait(?Send)]
impl AuthProvider for MockAuth {
    async fn token(&self) -> Result<AuthToken, Error> {
        self.0.borrow().ok_or(Error::Unauthenticated)
    }
}
