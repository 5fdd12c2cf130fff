#![cfg(test)]

use std::collections::{HashMap, HashSet};

use chrono::Utc;

use crate::{
    api::{self, ActionKind, CommentId, PostId, UserId},
    testing::{feed, Harness},
    CommentTree, Error, InteractionStore, Post, ThreadNode,
};

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    LikePost { fail: bool },
    SavePost { fail: bool },
    SharePost { fail: bool },
    ReportPost { fail: bool },
    Reply { parent: Option<u8>, text: u8, fail: bool },
    Edit { node: u8, text: u8, fail: bool },
    Delete { node: u8, fail: bool },
    LikeComment { node: u8, fail: bool },
    Collapse { node: u8 },
    Settle,
}

type CommentState = (Option<CommentId>, String, HashSet<UserId>);

struct World {
    h: Harness,
    user: UserId,
    post: PostId,
    store: InteractionStore,
    tree: CommentTree,
    injected: usize,
    rolled_back: usize,
}

impl World {
    /// A post owned by someone else, with a comment by a third user and a
    /// reply to it by the acting user.
    fn new() -> World {
        let (mut feed, users, post) = feed();
        let root = api::Comment {
            id: CommentId::new_v4(),
            post_id: post,
            parent_id: None,
            author_id: users.bob,
            text: String::from("first"),
            created_at: Utc::now(),
            edited_at: None,
            liked_by: vec![users.owner],
        };
        let answer = api::Comment {
            id: CommentId::new_v4(),
            post_id: post,
            parent_id: Some(root.id),
            author_id: users.alice,
            text: String::from("second"),
            created_at: Utc::now(),
            edited_at: None,
            liked_by: Vec::new(),
        };
        feed.comments = vec![root, answer];
        let h = Harness::new(feed);
        h.login(users.alice);
        let fetched = h.server.feed();
        let store = InteractionStore::with_posts(h.session.clone(), fetched.posts);
        let tree =
            CommentTree::from_fetched(h.session.clone(), post, users.owner, fetched.comments);
        World {
            h,
            user: users.alice,
            post,
            store,
            tree,
            injected: 0,
            rolled_back: 0,
        }
    }

    fn fail(&mut self, kind: ActionKind, fail: bool) {
        if fail {
            self.h
                .server
                .fail_next(kind, api::Error::Unknown(String::from("injected")));
            self.injected += 1;
        }
    }

    fn settle(&mut self) {
        self.rolled_back += self.h.settle().iter().filter(|e| e.is_rollback()).count();
    }

    fn pick(&self, node: u8) -> Option<CommentId> {
        let ids = self.comments().into_iter().map(|(id, _)| id).collect::<Vec<_>>();
        match ids.len() {
            0 => None,
            n => Some(ids[node as usize % n]),
        }
    }

    /// Every comment in thread order, checking that the reply counts and
    /// parent links agree with the tree structure.
    fn comments(&self) -> Vec<(CommentId, CommentState)> {
        fn flatten(
            tree: &CommentTree,
            nodes: &[ThreadNode],
            parent: Option<CommentId>,
            out: &mut Vec<(CommentId, CommentState)>,
        ) {
            for n in nodes {
                let c = &n.comment;
                assert_eq!(c.parent_id, parent);
                assert_eq!(tree.reply_count(&c.id), Ok(n.reply_count));
                assert_eq!(
                    n.reply_count,
                    n.replies.iter().map(|r| 1 + r.reply_count).sum::<usize>()
                );
                out.push((c.id, (c.parent_id, c.text.clone(), c.liked_by.clone())));
                flatten(tree, &n.replies, Some(c.id), out);
            }
        }
        let mut res = Vec::new();
        flatten(&self.tree, &self.tree.snapshot(), None, &mut res);
        assert_eq!(res.len(), self.tree.len());
        res
    }

    fn check_tree(&self) {
        let comments = self.comments();
        let parents = comments
            .iter()
            .map(|(id, (p, _, _))| (*id, *p))
            .collect::<HashMap<_, _>>();
        let hidden = |id: &CommentId| {
            let mut cur = parents[id];
            while let Some(p) = cur {
                if self.tree.is_collapsed(&p) {
                    return true;
                }
                cur = parents[&p];
            }
            false
        };
        let visible = self.tree.visible();
        assert_eq!(
            visible.len(),
            comments.iter().filter(|(id, _)| !hidden(id)).count()
        );
        for (depth, id) in visible {
            assert!(!hidden(&id));
            let mut ancestors = 0;
            let mut cur = parents[&id];
            while let Some(p) = cur {
                ancestors += 1;
                cur = parents[&p];
            }
            assert_eq!(depth, ancestors);
        }
    }

    fn apply(&mut self, op: FuzzOp) {
        let user = Some(self.user);
        match op {
            FuzzOp::LikePost { fail } => {
                if let Ok(now) = self.store.toggle_like(self.post, user) {
                    let p = self.store.post(&self.post).unwrap();
                    assert_eq!(p.is_liked_by(&self.user), now);
                    self.fail(ActionKind::Like, fail);
                }
            }
            FuzzOp::SavePost { fail } => {
                if let Ok(now) = self.store.toggle_save(self.post, user) {
                    let p = self.store.post(&self.post).unwrap();
                    assert_eq!(p.is_saved_by(&self.user), now);
                    self.fail(ActionKind::Save, fail);
                }
            }
            FuzzOp::SharePost { fail } => {
                if let Ok(shares) = self.store.increment_share(self.post) {
                    assert_eq!(self.store.post(&self.post).unwrap().share_count, shares);
                    self.fail(ActionKind::Share, fail);
                }
            }
            FuzzOp::ReportPost { fail } => match self.store.report_once(self.post, user, None) {
                Ok(()) => self.fail(ActionKind::Report, fail),
                Err(e) => assert!(matches!(
                    e,
                    Error::AlreadyReported | Error::ConcurrentActionInProgress
                )),
            },
            FuzzOp::Reply { parent, text, fail } => {
                let parent = parent.and_then(|p| self.pick(p));
                let text = format!("reply {}", text);
                match self.tree.add_reply(parent, &text, user) {
                    Ok(id) => {
                        assert!(self.tree.is_pending(&id));
                        self.fail(ActionKind::Reply, fail);
                    }
                    Err(e) => assert_eq!(e, Error::ConcurrentActionInProgress),
                }
            }
            FuzzOp::Edit { node, text, fail } => {
                if let Some(id) = self.pick(node) {
                    let text = format!("edit {}", text);
                    if let Ok(true) = self.tree.edit_text(id, &text, user) {
                        assert_eq!(self.tree.comment(&id).unwrap().text, text);
                        self.fail(ActionKind::Edit, fail);
                    }
                }
            }
            FuzzOp::Delete { node, fail } => {
                if let Some(id) = self.pick(node) {
                    let before = self.tree.len();
                    if let Ok(removed) = self.tree.delete_node(id, user) {
                        assert!(removed >= 1);
                        assert_eq!(self.tree.len(), before - removed);
                        assert!(self.tree.comment(&id).is_none());
                        self.fail(ActionKind::Delete, fail);
                    }
                }
            }
            FuzzOp::LikeComment { node, fail } => {
                if let Some(id) = self.pick(node) {
                    if let Ok(now) = self.tree.toggle_like(id, user) {
                        let c = self.tree.comment(&id).unwrap();
                        assert_eq!(c.liked_by.contains(&self.user), now);
                        self.fail(ActionKind::LikeComment, fail);
                    }
                }
            }
            FuzzOp::Collapse { node } => {
                if let Some(id) = self.pick(node) {
                    let now = self.tree.toggle_collapsed(&id).unwrap();
                    assert_eq!(self.tree.is_collapsed(&id), now);
                }
            }
            FuzzOp::Settle => self.settle(),
        }
        self.check_tree();
    }

    /// Once everything settled, local state must match the service's.
    fn check_converged(&mut self) {
        self.settle();
        assert_eq!(self.injected, self.rolled_back);

        let server_post = self.h.server.post(&self.post).unwrap();
        assert_eq!(self.store.post(&self.post).unwrap(), Post::from(server_post));

        let local = self.comments();
        assert!(local.iter().all(|(id, _)| !self.tree.is_pending(id)));
        let local = local.into_iter().collect::<HashMap<_, _>>();
        let remote = self
            .h
            .server
            .feed()
            .comments
            .into_iter()
            .filter(|c| c.post_id == self.post)
            .map(|c| {
                let liked_by = c.liked_by.into_iter().collect();
                (c.id, (c.parent_id, c.text, liked_by))
            })
            .collect::<HashMap<_, _>>();
        assert_eq!(local, remote);
    }
}

#[test]
fn fuzz_optimistic_actions_converge() {
    bolero::check!()
        .with_type::<Vec<FuzzOp>>()
        .cloned()
        .for_each(|ops| {
            let mut world = World::new();
            for op in ops {
                world.apply(op);
            }
            world.check_converged();
        })
}
