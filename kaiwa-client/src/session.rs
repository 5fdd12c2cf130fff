use std::{
    cell::RefCell,
    future::Future,
    marker::PhantomData,
    rc::{Rc, Weak},
};

use futures::{channel::mpsc, future::LocalBoxFuture, FutureExt};

use crate::{
    api::{AuthProvider, CommentService, PostService},
    Error, FeedEvent,
};

pub type EventReceiver = mpsc::UnboundedReceiver<FeedEvent>;

/// Runs confirmation futures on the presentation layer's thread.
pub trait Spawner {
    fn spawn_local(&self, fut: LocalBoxFuture<'static, ()>);
}

impl Spawner for futures::executor::LocalSpawner {
    fn spawn_local(&self, fut: LocalBoxFuture<'static, ()>) {
        // On failure the future is dropped here, which settles it as cancelled
        if let Err(err) = futures::task::LocalSpawnExt::spawn_local(self, fut) {
            tracing::error!(?err, "failed spawning confirmation");
        }
    }
}

/// External collaborators shared by the stores of one displayed feed.
#[derive(Clone)]
pub struct Session {
    pub(crate) auth: Rc<dyn AuthProvider>,
    pub(crate) posts: Rc<dyn PostService>,
    pub(crate) comments: Rc<dyn CommentService>,
    spawner: Rc<dyn Spawner>,
    events: mpsc::UnboundedSender<FeedEvent>,
}

impl Session {
    pub fn new(
        auth: Rc<dyn AuthProvider>,
        posts: Rc<dyn PostService>,
        comments: Rc<dyn CommentService>,
        spawner: Rc<dyn Spawner>,
    ) -> (Session, EventReceiver) {
        let (events, receiver) = mpsc::unbounded();
        let session = Session {
            auth,
            posts,
            comments,
            spawner,
            events,
        };
        (session, receiver)
    }

    /// Spawns `request` and feeds its result into `reconcile`, run against the
    /// store's state if the store is still alive. The returned event is then
    /// emitted. Must not be called while `state` is borrowed.
    pub(crate) fn confirm<S, T, Fut, R>(&self, state: &Rc<RefCell<S>>, request: Fut, reconcile: R)
    where
        S: 'static,
        T: 'static,
        Fut: Future<Output = Result<T, Error>> + 'static,
        R: FnOnce(&mut S, Result<T, Error>) -> FeedEvent + 'static,
    {
        let mut settle = Settle {
            state: Rc::downgrade(state),
            events: self.events.clone(),
            reconcile: Some(reconcile),
            result: PhantomData,
        };
        self.spawner.spawn_local(
            async move {
                let res = request.await;
                settle.settle(res);
            }
            .boxed_local(),
        );
    }
}

/// Settles one confirmation exactly once, as `Error::Cancelled` if it gets
/// dropped before its request completed.
struct Settle<S, T, R>
where
    R: FnOnce(&mut S, Result<T, Error>) -> FeedEvent,
{
    state: Weak<RefCell<S>>,
    events: mpsc::UnboundedSender<FeedEvent>,
    reconcile: Option<R>,
    result: PhantomData<fn(T)>,
}

impl<S, T, R> Settle<S, T, R>
where
    R: FnOnce(&mut S, Result<T, Error>) -> FeedEvent,
{
    fn settle(&mut self, res: Result<T, Error>) {
        let reconcile = match self.reconcile.take() {
            Some(r) => r,
            None => return,
        };
        let state = match self.state.upgrade() {
            Some(state) => state,
            None => {
                tracing::trace!("store dropped before its confirmation settled");
                return;
            }
        };
        let event = match state.try_borrow_mut() {
            Ok(mut state) => reconcile(&mut state, res),
            Err(_) => {
                tracing::error!("store state borrowed while settling a confirmation");
                return;
            }
        };
        // The presentation layer may have stopped listening, that is fine
        let _ = self.events.unbounded_send(event);
    }
}

impl<S, T, R> Drop for Settle<S, T, R>
where
    R: FnOnce(&mut S, Result<T, Error>) -> FeedEvent,
{
    fn drop(&mut self) {
        self.settle(Err(Error::Cancelled));
    }
}
