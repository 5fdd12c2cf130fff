use crate::{api::UserId, Comment};

/// What a user may do to a comment. Post owners moderate: they may delete any
/// comment on their post, but only authors may edit a comment's text.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CommentPerms {
    pub can_edit: bool,
    pub can_delete: bool,
}

impl CommentPerms {
    pub fn none() -> CommentPerms {
        CommentPerms {
            can_edit: false,
            can_delete: false,
        }
    }

    pub fn for_user(comment: &Comment, user: Option<&UserId>, post_owner: &UserId) -> CommentPerms {
        let user = match user {
            Some(u) => u,
            None => return CommentPerms::none(),
        };
        let is_author = comment.author_id == *user;
        CommentPerms {
            can_edit: is_author,
            can_delete: can_act(comment, user, post_owner),
        }
    }
}

/// Authorship or ownership of the post grants rights over a comment.
pub fn can_act(comment: &Comment, user: &UserId, post_owner: &UserId) -> bool {
    comment.author_id == *user || *user == *post_owner
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::api::{CommentId, Uuid};

    fn comment_by(author: UserId) -> Comment {
        Comment {
            id: CommentId::new_v4(),
            parent_id: None,
            author_id: author,
            text: String::from("hi"),
            created_at: Utc::now(),
            edited_at: None,
            liked_by: Default::default(),
            confirmed: true,
        }
    }

    #[test]
    fn post_owner_may_delete_but_not_edit() {
        let owner = UserId(Uuid::new_v4());
        let author = UserId(Uuid::new_v4());
        let c = comment_by(author);
        assert_eq!(
            CommentPerms::for_user(&c, Some(&owner), &owner),
            CommentPerms {
                can_edit: false,
                can_delete: true,
            }
        );
        assert!(can_act(&c, &owner, &owner));
    }

    #[test]
    fn author_may_do_everything() {
        let owner = UserId(Uuid::new_v4());
        let author = UserId(Uuid::new_v4());
        let c = comment_by(author);
        assert_eq!(
            CommentPerms::for_user(&c, Some(&author), &owner),
            CommentPerms {
                can_edit: true,
                can_delete: true,
            }
        );
    }

    #[test]
    fn strangers_and_anonymous_may_do_nothing() {
        let owner = UserId(Uuid::new_v4());
        let c = comment_by(UserId(Uuid::new_v4()));
        let stranger = UserId(Uuid::new_v4());
        assert_eq!(
            CommentPerms::for_user(&c, Some(&stranger), &owner),
            CommentPerms::none()
        );
        assert_eq!(CommentPerms::for_user(&c, None, &owner), CommentPerms::none());
        assert!(!can_act(&c, &stranger, &owner));
    }
}
