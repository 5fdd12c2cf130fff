use std::fmt;

/// Kinds of user interactions that go through optimistic confirmation.
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Like,
    Save,
    Share,
    Report,
    Reply,
    Edit,
    Delete,
    LikeComment,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Like => "like",
            ActionKind::Save => "save",
            ActionKind::Share => "share",
            ActionKind::Report => "report",
            ActionKind::Reply => "reply",
            ActionKind::Edit => "edit",
            ActionKind::Delete => "delete",
            ActionKind::LikeComment => "like-comment",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<ActionKind, String> {
        Ok(match s {
            "like" => ActionKind::Like,
            "save" => ActionKind::Save,
            "share" => ActionKind::Share,
            "report" => ActionKind::Report,
            "reply" => ActionKind::Reply,
            "edit" => ActionKind::Edit,
            "delete" => ActionKind::Delete,
            "like-comment" => ActionKind::LikeComment,
            _ => return Err(format!("unknown action kind {s:?}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_serde() {
        for k in [
            ActionKind::Like,
            ActionKind::Save,
            ActionKind::Share,
            ActionKind::Report,
            ActionKind::Reply,
            ActionKind::Edit,
            ActionKind::Delete,
            ActionKind::LikeComment,
        ] {
            assert_eq!(
                serde_json::to_string(&k).unwrap(),
                format!("\"{}\"", k.as_str())
            );
            assert_eq!(k.as_str().parse::<ActionKind>(), Ok(k));
        }
    }
}
