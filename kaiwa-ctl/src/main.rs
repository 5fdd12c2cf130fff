use std::{
    path::{Path, PathBuf},
    rc::Rc,
};

use anyhow::{anyhow, Context};
use futures::{future::LocalBoxFuture, StreamExt};
use kaiwa_api::{ActionKind, CommentId, Feed, PostId, UserId, Uuid};
use kaiwa_client::{
    CommentTree, EventReceiver, InteractionStore, Outcome, Session, Spawner, ThreadNode,
};
use kaiwa_mock_server::{MockAuth, MockServer};

#[derive(structopt::StructOpt)]
struct Opt {
    /// JSON feed to load into the mock service
    #[structopt(long, parse(from_os_str))]
    feed: PathBuf,

    /// User to act as, anonymous if unset
    #[structopt(long)]
    user: Option<Uuid>,

    /// Make the next call of this kind fail, can be repeated
    #[structopt(long)]
    fail: Vec<ActionKind>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Toggle the like of a post
    Like { post: Uuid },

    /// Toggle the save of a post
    Save { post: Uuid },

    /// Share a post
    Share { post: Uuid },

    /// Report a post
    Report {
        post: Uuid,

        #[structopt(long)]
        reason: Option<String>,
    },

    /// Comment on a post, or reply to a comment
    Reply {
        post: Uuid,
        text: String,

        #[structopt(long)]
        parent: Option<Uuid>,
    },

    /// Change the text of a comment
    Edit {
        post: Uuid,
        comment: Uuid,
        text: String,
    },

    /// Delete a comment and its replies
    Delete { post: Uuid, comment: Uuid },

    /// Toggle the like of a comment
    LikeComment { post: Uuid, comment: Uuid },

    /// Display the comments of a post
    Thread { post: Uuid },
}

impl Command {
    fn post(&self) -> PostId {
        match self {
            Command::Like { post }
            | Command::Save { post }
            | Command::Share { post }
            | Command::Report { post, .. }
            | Command::Reply { post, .. }
            | Command::Edit { post, .. }
            | Command::Delete { post, .. }
            | Command::LikeComment { post, .. }
            | Command::Thread { post } => PostId(*post),
        }
    }
}

/// Runs confirmations on the current `LocalSet`.
struct TokioLocal;

impl Spawner for TokioLocal {
    fn spawn_local(&self, fut: LocalBoxFuture<'static, ()>) {
        tokio::task::spawn_local(fut);
    }
}

fn load_feed(path: &Path) -> anyhow::Result<Feed> {
    let data = std::fs::read(path).with_context(|| format!("reading feed {:?}", path))?;
    serde_json::from_slice(&data).with_context(|| format!("parsing feed {:?}", path))
}

fn print_thread(nodes: &[ThreadNode], depth: usize) {
    for n in nodes {
        let c = &n.comment;
        println!(
            "{:indent$}{} by {} ({} replies, {} likes): {}",
            "",
            c.id.0,
            c.author_id.0,
            n.reply_count,
            c.like_count(),
            c.text,
            indent = 2 * depth,
        );
        print_thread(&n.replies, depth + 1);
    }
}

async fn wait_event(events: &mut EventReceiver) -> anyhow::Result<()> {
    let event = events
        .next()
        .await
        .ok_or_else(|| anyhow!("event stream closed before confirmation"))?;
    match event.outcome {
        Outcome::Confirmed(state) => {
            println!("confirmed {} on {:?}: {:?}", event.kind, event.entity, state)
        }
        Outcome::RolledBack(err) => {
            println!("rolled back {} on {:?}: {}", event.kind, event.entity, err)
        }
    }
    Ok(())
}

async fn run(opt: Opt) -> anyhow::Result<()> {
    let feed = load_feed(&opt.feed)?;
    let post = opt.cmd.post();
    let owner = feed
        .posts
        .iter()
        .find(|p| p.id == post)
        .map(|p| p.author_id)
        .ok_or_else(|| anyhow!("post {} is not in the feed", post.0))?;
    let comments = feed.comments_for(post);

    let server = Rc::new(MockServer::from_feed(feed.clone()));
    let auth = Rc::new(MockAuth::new(None));
    let user = opt.user.map(UserId);
    if let Some(user) = user {
        let tok = server
            .auth(user)
            .with_context(|| format!("logging in as {}", user.0))?;
        auth.set(Some(tok));
    }
    for kind in opt.fail {
        tracing::info!(%kind, "injecting failure");
        let err = kaiwa_api::Error::Unknown(format!("injected {} failure", kind));
        server.fail_next(kind, err);
    }

    let (session, mut events) =
        Session::new(auth, server.clone(), server.clone(), Rc::new(TokioLocal));
    let store = InteractionStore::with_posts(session.clone(), feed.posts);
    let tree = CommentTree::from_fetched(session, post, owner, comments);

    match opt.cmd {
        Command::Like { .. } => {
            let liked = store.toggle_like(post, user)?;
            println!("liked: {}", liked);
        }
        Command::Save { .. } => {
            let saved = store.toggle_save(post, user)?;
            println!("saved: {}", saved);
        }
        Command::Share { .. } => {
            let shares = store.increment_share(post)?;
            println!("shares: {}", shares);
        }
        Command::Report { reason, .. } => {
            store.report_once(post, user, reason)?;
            println!("reported");
        }
        Command::Reply { text, parent, .. } => {
            let id = tree.add_reply(parent.map(CommentId), &text, user)?;
            println!("provisional comment {}", id.0);
        }
        Command::Edit { comment, text, .. } => {
            if !tree.edit_text(CommentId(comment), &text, user)? {
                println!("text unchanged");
                return Ok(());
            }
            println!("edited");
        }
        Command::Delete { comment, .. } => {
            let removed = tree.delete_node(CommentId(comment), user)?;
            println!("removed {} comments", removed);
        }
        Command::LikeComment { comment, .. } => {
            let liked = tree.toggle_like(CommentId(comment), user)?;
            println!("liked: {}", liked);
        }
        Command::Thread { .. } => {
            print_thread(&tree.snapshot(), 0);
            return Ok(());
        }
    }
    wait_event(&mut events).await?;

    if let Some(p) = store.post(&post) {
        println!(
            "post {}: {} likes, {} saves, {} shares, {} reports",
            p.id.0,
            p.like_count(),
            p.saved_by.len(),
            p.share_count,
            p.reported_by.len(),
        );
    }
    print_thread(&tree.snapshot(), 0);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = <Opt as structopt::StructOpt>::from_args();
    tokio::task::LocalSet::new().run_until(run(opt)).await
}
