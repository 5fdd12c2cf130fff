use chrono::{Duration, Utc};
use kaiwa_api::{Comment, CommentId, Feed, Post, PostId, User, UserId};
use rand::{seq::SliceRandom, Rng};
use uuid::Uuid;

const NUM_USERS: usize = 5;
const NUM_POSTS: usize = 10;
const NUM_COMMENTS: usize = 100;

const POST_WORD_COUNT: usize = 30;
const COMMENT_WORD_COUNT: usize = 12;

/// Probability for a comment to answer an earlier comment instead of the post
const REPLY_PROBABILITY: f64 = 0.6;
const LIKE_PROBABILITY: f64 = 0.3;

fn gen_members(rng: &mut impl Rng, users: &[UserId], p: f64) -> Vec<UserId> {
    users.iter().copied().filter(|_| rng.gen_bool(p)).collect()
}

fn main() -> anyhow::Result<()> {
    let mut rng = rand::thread_rng();
    let start = Utc::now() - Duration::days(7);

    // Generate users
    let users = (0..NUM_USERS)
        .map(|i| User {
            id: UserId(Uuid::new_v4()),
            name: format!("user{}", i),
        })
        .collect::<Vec<_>>();
    let user_ids = users.iter().map(|u| u.id).collect::<Vec<_>>();

    // Generate posts
    let posts = (0..NUM_POSTS)
        .map(|i| Post {
            id: PostId(Uuid::new_v4()),
            author_id: user_ids[rng.gen_range(0..user_ids.len())],
            date: start + Duration::hours(i as i64),
            text: lipsum::lipsum_words(POST_WORD_COUNT),
            liked_by: gen_members(&mut rng, &user_ids, LIKE_PROBABILITY),
            saved_by: gen_members(&mut rng, &user_ids, 0.1),
            share_count: rng.gen_range(0..20),
            reported_by: gen_members(&mut rng, &user_ids, 0.02),
        })
        .collect::<Vec<_>>();

    // Generate comments in chronological order, so that every reply comes
    // after the comment it answers
    let mut comments: Vec<Comment> = Vec::with_capacity(NUM_COMMENTS);
    for i in 0..NUM_COMMENTS {
        let post = posts
            .choose(&mut rng)
            .map(|p| p.id)
            .ok_or_else(|| anyhow::anyhow!("no post generated"))?;
        let parent = match rng.gen_bool(REPLY_PROBABILITY) {
            true => comments
                .iter()
                .filter(|c| c.post_id == post)
                .collect::<Vec<_>>()
                .choose(&mut rng)
                .map(|c| c.id),
            false => None,
        };
        comments.push(Comment {
            id: CommentId(Uuid::new_v4()),
            post_id: post,
            parent_id: parent,
            author_id: user_ids[rng.gen_range(0..user_ids.len())],
            text: lipsum::lipsum_words(COMMENT_WORD_COUNT),
            created_at: start + Duration::days(1) + Duration::minutes(i as i64),
            edited_at: None,
            liked_by: gen_members(&mut rng, &user_ids, LIKE_PROBABILITY),
        });
    }

    let feed = Feed {
        users,
        posts,
        comments,
    };
    println!("{}", serde_json::to_string_pretty(&feed)?);
    Ok(())
}
