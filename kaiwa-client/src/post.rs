use std::collections::HashSet;

use crate::api::{self, PostId, Time, UserId};

/// Per-user flags a post carries.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Flag {
    Liked,
    Saved,
    Reported,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub date: Time,
    pub text: String,

    pub liked_by: HashSet<UserId>,
    pub saved_by: HashSet<UserId>,
    pub share_count: u64,
    pub reported_by: HashSet<UserId>,
}

impl From<api::Post> for Post {
    fn from(p: api::Post) -> Post {
        Post {
            id: p.id,
            author_id: p.author_id,
            date: p.date,
            text: p.text,
            liked_by: p.liked_by.into_iter().collect(),
            saved_by: p.saved_by.into_iter().collect(),
            share_count: p.share_count,
            reported_by: p.reported_by.into_iter().collect(),
        }
    }
}

impl Post {
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        self.author_id == *user
    }

    pub fn like_count(&self) -> usize {
        self.liked_by.len()
    }

    pub fn is_liked_by(&self, user: &UserId) -> bool {
        self.liked_by.contains(user)
    }

    pub fn is_saved_by(&self, user: &UserId) -> bool {
        self.saved_by.contains(user)
    }

    pub fn is_reported_by(&self, user: &UserId) -> bool {
        self.reported_by.contains(user)
    }

    pub(crate) fn has_flag(&self, flag: Flag, user: &UserId) -> bool {
        match flag {
            Flag::Liked => self.is_liked_by(user),
            Flag::Saved => self.is_saved_by(user),
            Flag::Reported => self.is_reported_by(user),
        }
    }

    pub(crate) fn set_flag(&mut self, flag: Flag, user: UserId, on: bool) {
        let set = match flag {
            Flag::Liked => &mut self.liked_by,
            Flag::Saved => &mut self.saved_by,
            Flag::Reported => &mut self.reported_by,
        };
        if on {
            set.insert(user);
        } else {
            set.remove(&user);
        }
    }
}
