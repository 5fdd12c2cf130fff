use std::rc::Rc;

use chrono::Utc;
use futures::executor::LocalPool;
use kaiwa_mock_server::{MockAuth, MockServer};

use crate::{
    api::{Feed, Post, PostId, User, UserId, Uuid},
    EventReceiver, FeedEvent, Session,
};

pub struct Users {
    pub owner: UserId,
    pub alice: UserId,
    pub bob: UserId,
}

/// One post by `owner` with 5 shares and nothing else, plus two more users.
pub fn feed() -> (Feed, Users, PostId) {
    let users = Users {
        owner: UserId(Uuid::new_v4()),
        alice: UserId(Uuid::new_v4()),
        bob: UserId(Uuid::new_v4()),
    };
    let post = PostId(Uuid::new_v4());
    let feed = Feed {
        users: [("owner", users.owner), ("alice", users.alice), ("bob", users.bob)]
            .into_iter()
            .map(|(name, id)| User {
                id,
                name: String::from(name),
            })
            .collect(),
        posts: vec![Post {
            id: post,
            author_id: users.owner,
            date: Utc::now(),
            text: String::from("hello world"),
            liked_by: Vec::new(),
            saved_by: Vec::new(),
            share_count: 5,
            reported_by: Vec::new(),
        }],
        comments: Vec::new(),
    };
    (feed, users, post)
}

pub struct Harness {
    pub pool: LocalPool,
    pub server: Rc<MockServer>,
    pub auth: Rc<MockAuth>,
    pub session: Session,
    pub events: EventReceiver,
}

impl Harness {
    pub fn new(feed: Feed) -> Harness {
        if std::env::var("RUST_LOG").is_ok() {
            let _ = tracing_subscriber::fmt::try_init();
        }
        let pool = LocalPool::new();
        let server = Rc::new(MockServer::from_feed(feed));
        let auth = Rc::new(MockAuth::new(None));
        let (session, events) = Session::new(
            auth.clone(),
            server.clone(),
            server.clone(),
            Rc::new(pool.spawner()),
        );
        Harness {
            pool,
            server,
            auth,
            session,
            events,
        }
    }

    pub fn login(&self, user: UserId) {
        let tok = self.server.auth(user).expect("logging in test user");
        self.auth.set(Some(tok));
    }

    /// Runs every confirmation to completion and returns the emitted events
    pub fn settle(&mut self) -> Vec<FeedEvent> {
        self.pool.run_until_stalled();
        self.drain()
    }

    pub fn drain(&mut self) -> Vec<FeedEvent> {
        let mut res = Vec::new();
        while let Ok(e) = self.events.try_recv() {
            res.push(e);
        }
        res
    }
}
