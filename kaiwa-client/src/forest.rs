use std::collections::{HashMap, HashSet};

use crate::{
    api::{self, CommentId, Time, UserId},
    Error,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Comment {
    pub id: CommentId,
    pub parent_id: Option<CommentId>,
    pub author_id: UserId,
    pub text: String,
    pub created_at: Time,
    pub edited_at: Option<Time>,

    /// Set of users who liked this comment
    pub liked_by: HashSet<UserId>,

    /// False until the service assigned this comment its durable id
    pub confirmed: bool,
}

impl From<api::Comment> for Comment {
    fn from(c: api::Comment) -> Comment {
        Comment {
            id: c.id,
            parent_id: c.parent_id,
            author_id: c.author_id,
            text: c.text,
            created_at: c.created_at,
            edited_at: c.edited_at,
            liked_by: c.liked_by.into_iter().collect(),
            confirmed: true,
        }
    }
}

impl Comment {
    pub fn like_count(&self) -> usize {
        self.liked_by.len()
    }
}

/// A subtree cut out of a [`Forest`], kept so it can be put back where it was.
#[derive(Clone, Debug)]
pub struct Detached {
    root: CommentId,
    parent: Option<CommentId>,
    position: usize,
    nodes: Vec<Comment>,
    children: Vec<(CommentId, Vec<CommentId>)>,
}

impl Detached {
    pub fn root(&self) -> CommentId {
        self.root
    }

    pub fn parent(&self) -> Option<CommentId> {
        self.parent
    }

    pub fn ids(&self) -> impl Iterator<Item = CommentId> + '_ {
        self.nodes.iter().map(|c| c.id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Reply forest stored flat: nodes by id, plus ordered child lists. Sibling
/// order is insertion order, which is chronological.
///
/// Every node's `parent_id` is either `None` (then it is listed in `roots`)
/// or the id of a node present in the forest that lists it as a child. A node
/// can only be linked under a node already present, so no cycle can form.
#[derive(Clone, Debug, Default)]
pub struct Forest {
    nodes: HashMap<CommentId, Comment>,
    roots: Vec<CommentId>,
    children: HashMap<CommentId, Vec<CommentId>>,
}

impl Forest {
    pub fn new() -> Forest {
        Forest::default()
    }

    /// Builds a forest from a flat fetched list. Comments whose parent is
    /// missing are kept as top-level comments, along with their replies. A
    /// cycle of parent links is cut at its oldest comment.
    pub fn from_fetched(mut comments: Vec<api::Comment>) -> Forest {
        let mut forest = Forest::new();
        comments.sort_by_key(|c| c.created_at);
        let mut pending = comments;
        loop {
            pending = forest.link_fetched(pending);
            if pending.is_empty() {
                break;
            }
            let waiting = pending.iter().map(|c| c.id).collect::<HashSet<_>>();
            let mut orphans = pending
                .iter_mut()
                .filter(|c| c.parent_id.map(|p| !waiting.contains(&p)).unwrap_or(false))
                .peekable();
            if orphans.peek().is_some() {
                for c in orphans {
                    tracing::warn!(
                        comment = ?c.id,
                        parent = ?c.parent_id,
                        "comment parent not found, showing it top-level"
                    );
                    c.parent_id = None;
                }
            } else if let Some(c) = pending.first_mut() {
                // Only cycles are left
                tracing::warn!(
                    comment = ?c.id,
                    "comment is its own ancestor, showing it top-level"
                );
                c.parent_id = None;
            }
        }
        forest
    }

    /// Inserts every comment whose parent is present, until no more can be.
    /// Returns the comments still waiting for their parent.
    fn link_fetched(&mut self, mut pending: Vec<api::Comment>) -> Vec<api::Comment> {
        loop {
            let before = pending.len();
            let mut deferred = Vec::new();
            for c in pending {
                match c.parent_id {
                    Some(p) if !self.contains(&p) => deferred.push(c),
                    _ => self.insert_fetched(Comment::from(c)),
                }
            }
            pending = deferred;
            if pending.is_empty() || pending.len() == before {
                return pending;
            }
        }
    }

    fn insert_fetched(&mut self, c: Comment) {
        let id = c.id;
        match self.insert(c) {
            Ok(true) => (),
            Ok(false) => tracing::warn!(comment = ?id, "duplicate comment in fetched data"),
            Err(err) => tracing::warn!(comment = ?id, %err, "failed inserting fetched comment"),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &CommentId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &CommentId) -> Option<&Comment> {
        self.nodes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &CommentId) -> Option<&mut Comment> {
        self.nodes.get_mut(id)
    }

    pub fn roots(&self) -> &[CommentId] {
        &self.roots
    }

    pub fn children(&self, id: &CommentId) -> &[CommentId] {
        self.children.get(id).map(|c| c.as_slice()).unwrap_or(&[])
    }

    fn siblings_mut(&mut self, parent: Option<CommentId>) -> &mut Vec<CommentId> {
        match parent {
            None => &mut self.roots,
            Some(p) => self.children.entry(p).or_default(),
        }
    }

    /// Appends `c` as the last child of its parent. Returns `Ok(false)` without
    /// touching anything if a comment with the same id is already present.
    pub fn insert(&mut self, c: Comment) -> Result<bool, Error> {
        if let Some(p) = &c.parent_id {
            if !self.contains(p) {
                return Err(Error::ParentNotFound);
            }
        }
        if self.contains(&c.id) {
            return Ok(false);
        }
        self.siblings_mut(c.parent_id).push(c.id);
        self.nodes.insert(c.id, c);
        Ok(true)
    }

    /// Number of comments below `id`, at any depth.
    pub fn reply_count(&self, id: &CommentId) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        Some(self.descendants(id).len())
    }

    /// Comments below `id` in depth-first order, not including `id` itself.
    pub fn descendants(&self, id: &CommentId) -> Vec<CommentId> {
        let mut res = Vec::new();
        let mut stack = self.children(id).iter().rev().copied().collect::<Vec<_>>();
        while let Some(c) = stack.pop() {
            res.push(c);
            stack.extend(self.children(&c).iter().rev().copied());
        }
        res
    }

    /// Every comment in depth-first display order, with its depth. Subtrees
    /// rooted at a comment for which `skip_below` holds are not descended into.
    pub fn walk(&self, skip_below: impl Fn(&CommentId) -> bool) -> Vec<(usize, CommentId)> {
        let mut res = Vec::with_capacity(self.nodes.len());
        let mut stack = self.roots.iter().rev().map(|r| (0, *r)).collect::<Vec<_>>();
        while let Some((depth, c)) = stack.pop() {
            res.push((depth, c));
            if !skip_below(&c) {
                stack.extend(self.children(&c).iter().rev().map(|ch| (depth + 1, *ch)));
            }
        }
        res
    }

    /// Cuts `id` and everything below it out of the forest.
    pub fn detach(&mut self, id: &CommentId) -> Option<Detached> {
        let parent = self.nodes.get(id)?.parent_id;
        let siblings = self.siblings_mut(parent);
        let position = siblings.iter().position(|s| s == id)?;
        siblings.remove(position);
        if let Some(p) = parent {
            if self.children.get(&p).map(|c| c.is_empty()).unwrap_or(false) {
                self.children.remove(&p);
            }
        }

        let mut ids = vec![*id];
        ids.extend(self.descendants(id));
        let mut nodes = Vec::with_capacity(ids.len());
        let mut children = Vec::new();
        for i in ids {
            if let Some(c) = self.children.remove(&i) {
                children.push((i, c));
            }
            if let Some(n) = self.nodes.remove(&i) {
                nodes.push(n);
            }
        }
        Some(Detached {
            root: *id,
            parent,
            position,
            nodes,
            children,
        })
    }

    /// Puts a detached subtree back at its former place among its siblings.
    /// Gives the subtree back if its parent is gone or its ids were reused.
    pub fn reattach(&mut self, d: Detached) -> Result<(), Detached> {
        if let Some(p) = &d.parent {
            if !self.contains(p) {
                return Err(d);
            }
        }
        if d.nodes.iter().any(|n| self.contains(&n.id)) {
            return Err(d);
        }
        let siblings = self.siblings_mut(d.parent);
        let position = d.position.min(siblings.len());
        siblings.insert(position, d.root);
        self.children.extend(d.children);
        self.nodes.extend(d.nodes.into_iter().map(|n| (n.id, n)));
        Ok(())
    }

    /// Replaces the id of comment `old` by `new`, keeping its place.
    pub fn rekey(&mut self, old: &CommentId, new: CommentId) -> bool {
        if self.contains(&new) {
            return false;
        }
        let mut node = match self.nodes.remove(old) {
            Some(n) => n,
            None => return false,
        };
        node.id = new;
        for s in self.siblings_mut(node.parent_id).iter_mut() {
            if s == old {
                *s = new;
            }
        }
        if let Some(children) = self.children.remove(old) {
            for c in &children {
                if let Some(c) = self.nodes.get_mut(c) {
                    c.parent_id = Some(new);
                }
            }
            self.children.insert(new, children);
        }
        self.nodes.insert(new, node);
        true
    }
}
