//! Background context running on a dedicated thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use bb_lookup::context::{BackgroundContext, ContextSpawner, ResponseSink};
use bb_lookup::message::{ContextMessage, Response};
use bb_lookup::LookupError;

use crate::store::ListStore;

/// Spawns one worker thread per context.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

impl ContextSpawner for ThreadSpawner {
    fn spawn(&self, sink: ResponseSink) -> Result<Box<dyn BackgroundContext>, LookupError> {
        Ok(Box::new(ThreadContext::start(sink)?))
    }
}

/// Handle to a worker thread.
///
/// Terminating never joins the thread: the coordinator calls it with its
/// lock held and the worker may be delivering a response at that moment.
#[derive(Debug)]
pub struct ThreadContext {
    sender: Option<Sender<ContextMessage>>,
    stopped: Arc<AtomicBool>,
}

impl ThreadContext {
    pub fn start(sink: ResponseSink) -> Result<Self, LookupError> {
        let (sender, receiver) = mpsc::channel();
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();

        thread::Builder::new()
            .name("bb-lookup-worker".to_string())
            .spawn(move || run(receiver, sink, flag))
            .map_err(|e| LookupError::Spawn(e.to_string()))?;

        Ok(Self {
            sender: Some(sender),
            stopped,
        })
    }
}

impl BackgroundContext for ThreadContext {
    fn post(&mut self, message: ContextMessage) {
        let Some(sender) = &self.sender else {
            log::warn!("Message posted to a terminated worker");
            return;
        };
        if sender.send(message).is_err() {
            log::warn!("Worker thread exited, message dropped");
        }
    }

    fn terminate(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.sender = None;
    }
}

impl Drop for ThreadContext {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn run(receiver: Receiver<ContextMessage>, sink: ResponseSink, stopped: Arc<AtomicBool>) {
    let mut store = ListStore::new();
    log::debug!("Worker thread started");

    while let Ok(message) = receiver.recv() {
        if stopped.load(Ordering::SeqCst) {
            break;
        }
        match message {
            ContextMessage::SetList {
                path,
                title,
                support_url,
                content,
            } => store.set_list(path, title, support_url, content),
            ContextMessage::ResetLists => store.reset(),
            ContextMessage::FromNetFilter {
                id,
                compiled_filter,
                raw_filter,
            } => sink.deliver(Response {
                id,
                response: store.from_net_filter(&compiled_filter, &raw_filter),
            }),
            ContextMessage::FromCosmeticFilter {
                id,
                domain,
                hostname,
                raw_filter,
            } => sink.deliver(Response {
                id,
                response: store.from_cosmetic_filter(&domain, &hostname, &raw_filter),
            }),
        }
    }

    log::debug!("Worker thread stopped with {} lists loaded", store.len());
}
