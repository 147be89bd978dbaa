//! Lifecycle of the background context.
//!
//! [`ReverseLookup`] owns at most one background context. The context is
//! created by the first lookup, primed with the enabled filter lists, and
//! torn down after `idle_ttl` without dispatches or on [`ReverseLookup::shutdown`].
//!
//! All state sits behind one mutex. Messages to the context are posted with
//! the lock held, so list content always reaches the context before the
//! ready signal and before any lookup request. Everything that may call back
//! into the coordinator (content fetches, user callbacks, teardown of
//! dropped callbacks) runs with the lock released.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::config::LookupConfig;
use crate::context::{BackgroundContext, ContextSpawner, InboundHandler, ResponseSink};
use crate::correlator::{Correlator, ResponseCallback};
use crate::domain::DomainResolver;
use crate::message::{ContextMessage, LookupRequest, LookupResponse, Response};
use crate::priming::{collect_entries, ListEntries, PrimingRun, ReadyCallback};
use crate::sources::{ListContent, ListContentSource, ListRegistry};
use crate::timer::{Scheduler, TimerHandle};

/// External collaborators of a [`ReverseLookup`].
pub struct Collaborators {
    pub spawner: Arc<dyn ContextSpawner>,
    pub registry: Arc<dyn ListRegistry>,
    pub content: Arc<dyn ListContentSource>,
    pub resolver: Arc<dyn DomainResolver>,
    pub scheduler: Arc<dyn Scheduler>,
}

/// Priming state of the current context.
enum ListsState {
    /// Lists must be (re)loaded on the next activation
    Needed,
    /// A priming run is in flight
    Priming(PrimingRun),
    /// The context holds every enabled list
    Ready,
}

/// The single idle timer.
///
/// Every arm or disarm bumps the generation; a firing timer only counts
/// when its generation is still current.
#[derive(Default)]
struct IdleTimer {
    handle: Option<Box<dyn TimerHandle>>,
    generation: u64,
}

impl IdleTimer {
    fn disarm(&mut self) -> Option<Box<dyn TimerHandle>> {
        self.generation += 1;
        self.handle.take()
    }
}

struct Inner {
    context: Option<Box<dyn BackgroundContext>>,
    lists: ListsState,
    correlator: Correlator,
    idle: IdleTimer,
    next_run: u64,
}

/// Callbacks released by a teardown, dropped outside the lock.
struct Abandoned {
    _callbacks: Vec<ResponseCallback>,
    _waiters: Vec<ReadyCallback>,
    timer: Option<Box<dyn TimerHandle>>,
}

impl Inner {
    fn teardown(&mut self) -> Option<Abandoned> {
        let mut context = self.context.take()?;
        let timer = self.idle.disarm();
        context.terminate();
        let waiters = match std::mem::replace(&mut self.lists, ListsState::Needed) {
            ListsState::Priming(run) => run.finish().waiters,
            ListsState::Needed | ListsState::Ready => Vec::new(),
        };
        let callbacks = self.correlator.clear();
        log::debug!(
            "Background context torn down ({} pending lookups dropped)",
            callbacks.len()
        );
        Some(Abandoned {
            _callbacks: callbacks,
            _waiters: waiters,
            timer,
        })
    }
}

impl Abandoned {
    fn release(self) {
        if let Some(timer) = self.timer {
            timer.cancel();
        }
    }
}

struct Shared {
    config: LookupConfig,
    deps: Collaborators,
    inner: Mutex<Inner>,
}

/// Reverse lookup coordinator.
///
/// Cheap to clone; clones share the same background context.
#[derive(Clone)]
pub struct ReverseLookup {
    shared: Arc<Shared>,
}

impl ReverseLookup {
    pub fn new(config: LookupConfig, deps: Collaborators) -> Self {
        let inner = Inner {
            context: None,
            lists: ListsState::Needed,
            correlator: Correlator::new(),
            idle: IdleTimer::default(),
            next_run: 1,
        };
        Self {
            shared: Arc::new(Shared {
                config,
                deps,
                inner: Mutex::new(inner),
            }),
        }
    }

    /// Find the enabled lists containing a network filter.
    ///
    /// Both inputs must be non-empty; otherwise `callback` runs immediately
    /// with `None` and nothing is sent. The callback is dropped without
    /// being called if the context is torn down before the answer arrives.
    pub fn lookup_by_net_filter<F>(&self, compiled_filter: &str, raw_filter: &str, callback: F)
    where
        F: FnOnce(Option<LookupResponse>) + Send + 'static,
    {
        if compiled_filter.is_empty() || raw_filter.is_empty() {
            callback(None);
            return;
        }
        let request = LookupRequest::NetFilter {
            compiled_filter: compiled_filter.to_string(),
            raw_filter: raw_filter.to_string(),
        };
        self.shared.submit(request, Box::new(callback));
    }

    /// Find the enabled lists containing a cosmetic filter seen on `hostname`.
    ///
    /// An empty `raw_filter` resolves immediately with `None`.
    pub fn lookup_by_cosmetic_filter<F>(&self, hostname: &str, raw_filter: &str, callback: F)
    where
        F: FnOnce(Option<LookupResponse>) + Send + 'static,
    {
        if raw_filter.is_empty() {
            callback(None);
            return;
        }
        let request = LookupRequest::CosmeticFilter {
            domain: self.shared.deps.resolver.domain_from_hostname(hostname),
            hostname: hostname.to_string(),
            raw_filter: raw_filter.to_string(),
        };
        self.shared.submit(request, Box::new(callback));
    }

    /// Awaitable form of [`Self::lookup_by_net_filter`].
    ///
    /// Resolves to `None` for invalid input, for "no result", and when the
    /// context is torn down before answering.
    pub async fn net_filter_lookup(
        &self,
        compiled_filter: &str,
        raw_filter: &str,
    ) -> Option<LookupResponse> {
        let (tx, rx) = oneshot::channel();
        self.lookup_by_net_filter(compiled_filter, raw_filter, move |response| {
            let _ = tx.send(response);
        });
        rx.await.ok().flatten()
    }

    /// Awaitable form of [`Self::lookup_by_cosmetic_filter`].
    pub async fn cosmetic_filter_lookup(
        &self,
        hostname: &str,
        raw_filter: &str,
    ) -> Option<LookupResponse> {
        let (tx, rx) = oneshot::channel();
        self.lookup_by_cosmetic_filter(hostname, raw_filter, move |response| {
            let _ = tx.send(response);
        });
        rx.await.ok().flatten()
    }

    /// The enabled lists or their content may have changed.
    ///
    /// The live context (if any) is told to drop its lists and the next
    /// activation primes it again.
    pub fn invalidate_lists(&self) {
        let mut inner = self.shared.inner.lock();
        match &mut inner.lists {
            ListsState::Priming(run) => run.mark_stale(),
            lists => *lists = ListsState::Needed,
        }
        if let Some(context) = inner.context.as_mut() {
            context.post(ContextMessage::ResetLists);
        }
    }

    /// Create and prime the context if needed, then run `on_ready`.
    ///
    /// Activations arriving while a priming run is in flight wait for that
    /// run. If the context cannot be created, `on_ready` is dropped.
    pub fn force_ready<F>(&self, on_ready: F)
    where
        F: FnOnce(Option<Arc<ListEntries>>) + Send + 'static,
    {
        self.shared.ensure_ready(Box::new(on_ready));
    }

    /// Tear the context down. Pending lookups are dropped without being
    /// called. Does nothing when no context is live.
    pub fn shutdown(&self) {
        let abandoned = self.shared.inner.lock().teardown();
        if let Some(abandoned) = abandoned {
            abandoned.release();
        }
    }

    /// Whether a background context currently exists.
    pub fn is_live(&self) -> bool {
        self.shared.inner.lock().context.is_some()
    }

    /// Whether the next activation will prime the context.
    pub fn needs_lists(&self) -> bool {
        match &self.shared.inner.lock().lists {
            ListsState::Needed => true,
            ListsState::Priming(run) => run.is_stale(),
            ListsState::Ready => false,
        }
    }

    /// Number of lookups waiting for an answer.
    pub fn pending_requests(&self) -> usize {
        self.shared.inner.lock().correlator.pending()
    }
}

impl std::fmt::Debug for ReverseLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("ReverseLookup")
            .field("live", &inner.context.is_some())
            .field("correlator", &inner.correlator)
            .finish()
    }
}

impl Shared {
    fn submit(self: &Arc<Self>, request: LookupRequest, callback: ResponseCallback) {
        // No idle teardown while this lookup waits for priming.
        let timer = self.inner.lock().idle.disarm();
        if let Some(timer) = timer {
            timer.cancel();
        }

        let weak = Arc::downgrade(self);
        self.ensure_ready(Box::new(move |_| {
            if let Some(shared) = weak.upgrade() {
                shared.dispatch(request, callback);
            }
        }));
    }

    fn ensure_ready(self: &Arc<Self>, on_ready: ReadyCallback) {
        let mut inner = self.inner.lock();

        if inner.context.is_none() {
            let handler: Weak<dyn InboundHandler> = Arc::downgrade(self) as Weak<dyn InboundHandler>;
            match self.deps.spawner.spawn(ResponseSink::new(handler)) {
                Ok(context) => {
                    log::debug!("Background context created");
                    inner.context = Some(context);
                }
                Err(e) => {
                    log::error!("Reverse lookup unavailable: {}", e);
                    return;
                }
            }
        }

        if let ListsState::Priming(run) = &mut inner.lists {
            run.add_waiter(on_ready);
            return;
        }
        if matches!(inner.lists, ListsState::Ready) {
            drop(inner);
            on_ready(None);
            return;
        }

        let entries = collect_entries(self.deps.registry.as_ref(), &self.config.user_filters_title);
        if entries.is_empty() {
            inner.lists = ListsState::Ready;
            drop(inner);
            on_ready(None);
            return;
        }

        let run_id = inner.next_run;
        inner.next_run += 1;
        let run = PrimingRun::new(run_id, entries, on_ready);
        let paths = run.paths();
        log::debug!("Priming background context with {} lists", paths.len());
        inner.lists = ListsState::Priming(run);
        drop(inner);

        for path in paths {
            let weak = Arc::downgrade(self);
            self.deps.content.fetch_compiled(
                &path,
                Box::new(move |loaded| {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_list_loaded(run_id, loaded);
                    }
                }),
            );
        }
    }

    fn on_list_loaded(self: &Arc<Self>, run_id: u64, loaded: ListContent) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let run = match &mut inner.lists {
            ListsState::Priming(run) if run.id() == run_id => run,
            _ => {
                log::debug!("Discarding content of '{}' from a superseded priming run", loaded.path);
                return;
            }
        };
        let Some(message) = run.accept(loaded) else {
            return;
        };
        if let Some(context) = inner.context.as_mut() {
            context.post(message);
        }
        if !run.is_complete() {
            return;
        }

        let ListsState::Priming(run) = std::mem::replace(&mut inner.lists, ListsState::Ready) else {
            return;
        };
        let finished = run.finish();
        if finished.stale {
            inner.lists = ListsState::Needed;
        }
        drop(guard);

        if finished.stale {
            log::debug!("Lists changed during priming, priming again");
            for waiter in finished.waiters {
                self.ensure_ready(waiter);
            }
            return;
        }

        log::debug!("Background context primed");
        for waiter in finished.waiters {
            waiter(Some(finished.entries.clone()));
        }
    }

    fn dispatch(self: &Arc<Self>, request: LookupRequest, callback: ResponseCallback) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let Some(context) = inner.context.as_mut() else {
            log::debug!("Background context gone before dispatch, dropping lookup");
            return;
        };
        let id = inner.correlator.dispatch(&mut **context, request, callback);
        log::debug!("Dispatched lookup {}", id);

        // The context is recycled after idle_ttl without dispatches.
        let stale = inner.idle.disarm();
        let generation = inner.idle.generation;
        let weak = Arc::downgrade(self);
        inner.idle.handle = Some(self.deps.scheduler.schedule(
            self.config.idle_ttl,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_idle_timeout(generation);
                }
            }),
        ));
        drop(guard);

        if let Some(timer) = stale {
            timer.cancel();
        }
    }

    fn on_idle_timeout(&self, generation: u64) {
        let abandoned = {
            let mut inner = self.inner.lock();
            if inner.idle.generation != generation {
                return;
            }
            inner.idle.handle = None;
            inner.teardown()
        };
        if let Some(abandoned) = abandoned {
            log::debug!("Background context idle, recycled");
            abandoned.release();
        }
    }
}

impl InboundHandler for Shared {
    fn on_inbound_message(&self, response: Response) {
        let callback = self.inner.lock().correlator.resolve(response.id);
        match callback {
            Some(callback) => callback(response.response),
            None => log::debug!("Ignoring response {} with no pending lookup", response.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HeuristicResolver;
    use crate::error::LookupError;
    use crate::message::ListMatch;
    use crate::sources::{ContentCallback, ListMeta, StaticRegistry};
    use crate::timer::{ManualScheduler, TimerTask};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    // -------------------------------------------------------------------------
    // Fakes
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct ContextLog {
        messages: Vec<ContextMessage>,
        spawned: usize,
        terminated: usize,
        sink: Option<ResponseSink>,
    }

    #[derive(Clone, Default)]
    struct FakeSpawner {
        log: Arc<Mutex<ContextLog>>,
        fail: Arc<AtomicBool>,
    }

    struct FakeContext {
        log: Arc<Mutex<ContextLog>>,
    }

    impl BackgroundContext for FakeContext {
        fn post(&mut self, message: ContextMessage) {
            self.log.lock().messages.push(message);
        }

        fn terminate(&mut self) {
            self.log.lock().terminated += 1;
        }
    }

    impl ContextSpawner for FakeSpawner {
        fn spawn(&self, sink: ResponseSink) -> Result<Box<dyn BackgroundContext>, LookupError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(LookupError::Spawn("no threads left".to_string()));
            }
            let mut log = self.log.lock();
            log.spawned += 1;
            log.sink = Some(sink);
            Ok(Box::new(FakeContext {
                log: self.log.clone(),
            }))
        }
    }

    impl FakeSpawner {
        fn messages(&self) -> Vec<ContextMessage> {
            self.log.lock().messages.clone()
        }

        fn lookup_ids(&self) -> Vec<u64> {
            self.messages().iter().filter_map(ContextMessage::id).collect()
        }

        fn set_list_paths(&self) -> Vec<String> {
            self.messages()
                .iter()
                .filter_map(|m| match m {
                    ContextMessage::SetList { path, .. } => Some(path.clone()),
                    _ => None,
                })
                .collect()
        }

        fn reply(&self, id: u64, filter: &str) {
            let sink = self.log.lock().sink.clone().expect("context spawned");
            sink.deliver(Response {
                id,
                response: Some(LookupResponse {
                    filter: filter.to_string(),
                    lists: vec![ListMatch {
                        path: "easylist".to_string(),
                        title: "EasyList".to_string(),
                        support_url: String::new(),
                    }],
                }),
            });
        }
    }

    /// Content source holding callbacks until the test releases them.
    #[derive(Default)]
    struct DeferredSource {
        requests: Mutex<Vec<(String, ContentCallback)>>,
    }

    impl ListContentSource for DeferredSource {
        fn fetch_compiled(&self, path: &str, on_loaded: ContentCallback) {
            self.requests.lock().push((path.to_string(), on_loaded));
        }
    }

    impl DeferredSource {
        fn requested(&self) -> Vec<String> {
            self.requests.lock().iter().map(|(p, _)| p.clone()).collect()
        }

        fn complete(&self, path: &str) {
            let callback = {
                let mut requests = self.requests.lock();
                let pos = requests.iter().position(|(p, _)| p == path).expect("requested");
                requests.remove(pos).1
            };
            callback(ListContent {
                path: path.to_string(),
                content: format!("content of {path}"),
            });
        }
    }

    struct Harness {
        lookup: ReverseLookup,
        spawner: FakeSpawner,
        registry: Arc<StaticRegistry>,
        source: Arc<DeferredSource>,
        scheduler: ManualScheduler,
    }

    fn harness(paths: &[&str]) -> Harness {
        let spawner = FakeSpawner::default();
        let registry = Arc::new(StaticRegistry::new("user-filters"));
        for path in paths {
            registry.insert(*path, ListMeta::new(path.to_uppercase()));
        }
        let source = Arc::new(DeferredSource::default());
        let scheduler = ManualScheduler::new();
        let lookup = ReverseLookup::new(
            LookupConfig::default(),
            Collaborators {
                spawner: Arc::new(spawner.clone()),
                registry: registry.clone(),
                content: source.clone(),
                resolver: Arc::new(HeuristicResolver),
                scheduler: Arc::new(scheduler.clone()),
            },
        );
        Harness {
            lookup,
            spawner,
            registry,
            source,
            scheduler,
        }
    }

    type Answers = Arc<Mutex<Vec<Option<LookupResponse>>>>;

    fn recorder() -> (Answers, impl Fn() -> Box<dyn FnOnce(Option<LookupResponse>) + Send>) {
        let answers: Answers = Arc::default();
        let sink = answers.clone();
        let make = move || -> Box<dyn FnOnce(Option<LookupResponse>) + Send> {
            let sink = sink.clone();
            Box::new(move |r| sink.lock().push(r))
        };
        (answers, make)
    }

    fn ready_counter() -> (Arc<AtomicUsize>, Arc<Mutex<Vec<Option<usize>>>>) {
        (Arc::default(), Arc::default())
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    #[test]
    fn test_no_lists_ready_synchronously() {
        let h = harness(&[]);
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();

        h.lookup.force_ready(move |entries| {
            assert!(entries.is_none());
            flag.store(true, Ordering::SeqCst);
        });

        assert!(called.load(Ordering::SeqCst));
        assert!(h.source.requested().is_empty());
        assert!(h.lookup.is_live());
        assert!(!h.lookup.needs_lists());
    }

    #[test]
    fn test_ready_only_after_every_list_arrives() {
        let h = harness(&["a", "b", "c"]);
        let (count, seen) = ready_counter();
        let (c, s) = (count.clone(), seen.clone());

        h.lookup.force_ready(move |entries| {
            c.fetch_add(1, Ordering::SeqCst);
            s.lock().push(entries.map(|e| e.len()));
        });
        assert_eq!(h.source.requested(), vec!["a", "b", "c"]);
        assert!(!h.lookup.needs_lists());

        h.source.complete("c");
        h.source.complete("a");
        assert_eq!(count.load(Ordering::SeqCst), 0);
        h.source.complete("b");

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), vec![Some(3)]);
        assert_eq!(h.spawner.set_list_paths(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_second_activation_waits_for_in_flight_priming() {
        let h = harness(&["a"]);
        let (count, seen) = ready_counter();

        for _ in 0..2 {
            let (c, s) = (count.clone(), seen.clone());
            h.lookup.force_ready(move |entries| {
                c.fetch_add(1, Ordering::SeqCst);
                s.lock().push(entries.map(|e| e.len()));
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(h.source.requested().len(), 1);

        h.source.complete("a");
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(h.spawner.log.lock().spawned, 1);
    }

    #[test]
    fn test_already_ready_calls_back_without_side_effects() {
        let h = harness(&["a"]);
        h.lookup.force_ready(|_| {});
        h.source.complete("a");
        let before = h.spawner.messages().len();

        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        h.lookup.force_ready(move |entries| {
            assert!(entries.is_none());
            flag.store(true, Ordering::SeqCst);
        });

        assert!(called.load(Ordering::SeqCst));
        assert_eq!(h.spawner.messages().len(), before);
        assert!(h.source.requested().is_empty());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let h = harness(&["a"]);
        h.lookup.shutdown();
        h.lookup.shutdown();
        assert!(!h.lookup.is_live());
        assert_eq!(h.spawner.log.lock().terminated, 0);

        h.lookup.force_ready(|_| {});
        h.source.complete("a");
        h.lookup.shutdown();
        h.lookup.shutdown();

        assert!(!h.lookup.is_live());
        assert!(h.lookup.needs_lists());
        assert_eq!(h.spawner.log.lock().terminated, 1);
    }

    #[test]
    fn test_invalidate_reprimes_live_context() {
        let h = harness(&["a", "b"]);
        h.lookup.force_ready(|_| {});
        h.source.complete("a");
        h.source.complete("b");

        h.lookup.invalidate_lists();
        assert!(h.lookup.needs_lists());
        assert_eq!(h.spawner.messages().last(), Some(&ContextMessage::ResetLists));

        let (count, _) = ready_counter();
        let c = count.clone();
        h.lookup.force_ready(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        h.source.complete("b");
        h.source.complete("a");

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(h.spawner.log.lock().spawned, 1);
        assert_eq!(h.spawner.set_list_paths(), vec!["a", "b", "b", "a"]);
    }

    #[test]
    fn test_invalidate_without_context_only_flags() {
        let h = harness(&["a"]);
        h.lookup.invalidate_lists();
        assert!(h.spawner.messages().is_empty());
        assert!(!h.lookup.is_live());
        assert!(h.lookup.needs_lists());
    }

    #[test]
    fn test_invalidate_during_priming_primes_again() {
        let h = harness(&["a"]);
        let (count, _) = ready_counter();
        let c = count.clone();
        h.lookup.force_ready(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        h.registry.insert("b", ListMeta::new("B"));
        h.lookup.invalidate_lists();
        h.source.complete("a");

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(h.source.requested(), vec!["a", "b"]);

        h.source.complete("a");
        h.source.complete("b");
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!h.lookup.needs_lists());
    }

    #[test]
    fn test_content_after_teardown_is_discarded() {
        let h = harness(&["a", "b"]);
        let (count, _) = ready_counter();
        let c = count.clone();
        h.lookup.force_ready(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        h.source.complete("a");
        h.lookup.shutdown();
        h.source.complete("b");

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(h.spawner.set_list_paths(), vec!["a"]);
        assert!(h.lookup.needs_lists());
    }

    #[test]
    fn test_spawn_failure_drops_lookup() {
        let h = harness(&[]);
        h.spawner.fail.store(true, Ordering::SeqCst);
        let (answers, make) = recorder();

        h.lookup.lookup_by_net_filter("c", "||ads^", make());

        assert!(answers.lock().is_empty());
        assert!(!h.lookup.is_live());
        assert_eq!(h.lookup.pending_requests(), 0);
    }

    // -------------------------------------------------------------------------
    // Correlation
    // -------------------------------------------------------------------------

    #[test]
    fn test_responses_match_ids_in_any_order() {
        let h = harness(&[]);
        let results: Arc<Mutex<Vec<(usize, String)>>> = Arc::default();

        for n in 0..3 {
            let results = results.clone();
            h.lookup.lookup_by_net_filter("c", &format!("filter{n}"), move |r| {
                results.lock().push((n, r.map(|r| r.filter).unwrap_or_default()));
            });
        }
        assert_eq!(h.spawner.lookup_ids(), vec![1, 2, 3]);
        assert_eq!(h.lookup.pending_requests(), 3);

        h.spawner.reply(3, "filter2");
        h.spawner.reply(1, "filter0");
        h.spawner.reply(2, "filter1");

        let mut got = results.lock().clone();
        got.sort();
        assert_eq!(
            got,
            vec![
                (0, "filter0".to_string()),
                (1, "filter1".to_string()),
                (2, "filter2".to_string()),
            ]
        );
        assert_eq!(h.lookup.pending_requests(), 0);
    }

    #[test]
    fn test_duplicate_response_invokes_once() {
        let h = harness(&[]);
        let (answers, make) = recorder();
        h.lookup.lookup_by_net_filter("c", "r", make());

        h.spawner.reply(1, "r");
        h.spawner.reply(1, "r");
        h.spawner.reply(42, "unknown");

        assert_eq!(answers.lock().len(), 1);
    }

    #[test]
    fn test_empty_inputs_short_circuit() {
        let h = harness(&["a"]);
        let (answers, make) = recorder();

        h.lookup.lookup_by_net_filter("", "raw", make());
        h.lookup.lookup_by_net_filter("compiled", "", make());
        h.lookup.lookup_by_cosmetic_filter("www.example.com", "", make());

        assert_eq!(*answers.lock(), vec![None, None, None]);
        assert!(!h.lookup.is_live());
        assert!(h.spawner.messages().is_empty());
        assert_eq!(h.scheduler.armed(), 0);

        h.lookup.lookup_by_net_filter("c", "r", make());
        h.source.complete("a");
        assert_eq!(h.spawner.lookup_ids(), vec![1]);
    }

    #[test]
    fn test_cosmetic_request_carries_domain() {
        let h = harness(&[]);
        h.lookup.lookup_by_cosmetic_filter("news.example.co.uk", "##.ad", |_| {});

        assert_eq!(
            h.spawner.messages(),
            vec![ContextMessage::FromCosmeticFilter {
                id: 1,
                domain: "example.co.uk".to_string(),
                hostname: "news.example.co.uk".to_string(),
                raw_filter: "##.ad".to_string(),
            }]
        );
    }

    #[test]
    fn test_lookup_waits_for_priming() {
        let h = harness(&["a", "b"]);
        let (answers, make) = recorder();
        h.lookup.lookup_by_net_filter("c", "r", make());

        assert!(h.spawner.lookup_ids().is_empty());
        h.source.complete("b");
        h.source.complete("a");

        let messages = h.spawner.messages();
        assert_eq!(messages.len(), 3);
        assert!(matches!(messages[2], ContextMessage::FromNetFilter { id: 1, .. }));

        h.spawner.reply(1, "r");
        assert_eq!(answers.lock().len(), 1);
    }

    #[test]
    fn test_ids_never_reused_across_recycle() {
        let h = harness(&[]);
        h.lookup.lookup_by_net_filter("c", "r1", |_| {});
        h.lookup.lookup_by_net_filter("c", "r2", |_| {});
        h.lookup.shutdown();
        h.lookup.lookup_by_net_filter("c", "r3", |_| {});

        assert_eq!(h.spawner.lookup_ids(), vec![1, 2, 3]);
        assert_eq!(h.spawner.log.lock().spawned, 2);
    }

    #[test]
    fn test_response_after_shutdown_is_ignored() {
        let h = harness(&[]);
        let (answers, make) = recorder();
        h.lookup.lookup_by_net_filter("c", "r", make());
        let old_sink = h.spawner.log.lock().sink.clone().unwrap();

        h.lookup.shutdown();
        assert_eq!(h.lookup.pending_requests(), 0);
        old_sink.deliver(Response {
            id: 1,
            response: None,
        });

        assert!(answers.lock().is_empty());
    }

    // -------------------------------------------------------------------------
    // Idle timer
    // -------------------------------------------------------------------------

    #[test]
    fn test_single_idle_timer_rescheduled_per_dispatch() {
        let h = harness(&[]);
        h.lookup.lookup_by_net_filter("c", "r1", |_| {});
        h.lookup.lookup_by_net_filter("c", "r2", |_| {});

        assert_eq!(h.scheduler.delays(), vec![Duration::from_secs(660)]);
    }

    #[test]
    fn test_idle_timeout_tears_down() {
        let h = harness(&["a"]);
        let (answers, make) = recorder();
        h.lookup.lookup_by_net_filter("c", "r", make());
        h.source.complete("a");
        assert!(h.lookup.is_live());

        assert_eq!(h.scheduler.fire_all(), 1);

        assert!(!h.lookup.is_live());
        assert!(h.lookup.needs_lists());
        assert_eq!(h.lookup.pending_requests(), 0);
        assert!(answers.lock().is_empty());
        assert_eq!(h.spawner.log.lock().terminated, 1);
    }

    #[test]
    fn test_force_ready_does_not_arm_timer() {
        let h = harness(&[]);
        h.lookup.force_ready(|_| {});
        assert_eq!(h.scheduler.armed(), 0);
    }

    #[test]
    fn test_shutdown_cancels_idle_timer() {
        let h = harness(&[]);
        h.lookup.lookup_by_net_filter("c", "r", |_| {});
        assert_eq!(h.scheduler.armed(), 1);

        h.lookup.shutdown();
        assert_eq!(h.scheduler.armed(), 0);
    }

    /// Scheduler whose cancel never wins, like an abort racing a task that
    /// already woke up.
    #[derive(Clone, Default)]
    struct LeakyScheduler {
        tasks: Arc<Mutex<Vec<TimerTask>>>,
    }

    struct NoCancel;

    impl TimerHandle for NoCancel {
        fn cancel(self: Box<Self>) {}
    }

    impl Scheduler for LeakyScheduler {
        fn schedule(&self, _delay: Duration, task: TimerTask) -> Box<dyn TimerHandle> {
            self.tasks.lock().push(task);
            Box::new(NoCancel)
        }
    }

    impl LeakyScheduler {
        fn fire_oldest(&self) {
            let task = self.tasks.lock().remove(0);
            task();
        }

        fn fire_newest(&self) {
            let task = self.tasks.lock().pop().expect("timer armed");
            task();
        }
    }

    fn leaky_lookup() -> (ReverseLookup, FakeSpawner, LeakyScheduler) {
        let spawner = FakeSpawner::default();
        let scheduler = LeakyScheduler::default();
        let lookup = ReverseLookup::new(
            LookupConfig::default(),
            Collaborators {
                spawner: Arc::new(spawner.clone()),
                registry: Arc::new(StaticRegistry::new("user-filters")),
                content: Arc::new(DeferredSource::default()),
                resolver: Arc::new(HeuristicResolver),
                scheduler: Arc::new(scheduler.clone()),
            },
        );
        (lookup, spawner, scheduler)
    }

    #[test]
    fn test_superseded_timer_firing_is_ignored() {
        let (lookup, spawner, scheduler) = leaky_lookup();

        lookup.lookup_by_net_filter("c", "r1", |_| {});
        lookup.lookup_by_net_filter("c", "r2", |_| {});
        assert_eq!(scheduler.tasks.lock().len(), 2);

        scheduler.fire_oldest();
        assert!(lookup.is_live());
        assert_eq!(lookup.pending_requests(), 2);
        assert_eq!(spawner.log.lock().terminated, 0);

        scheduler.fire_newest();
        assert!(!lookup.is_live());
        assert!(lookup.needs_lists());
        assert_eq!(lookup.pending_requests(), 0);
        assert_eq!(spawner.log.lock().terminated, 1);
    }

    #[test]
    fn test_timer_firing_after_shutdown_is_ignored() {
        let (lookup, spawner, scheduler) = leaky_lookup();

        lookup.lookup_by_net_filter("c", "r1", |_| {});
        lookup.shutdown();
        lookup.force_ready(|_| {});
        assert!(lookup.is_live());

        scheduler.fire_newest();
        assert!(lookup.is_live());
        assert_eq!(spawner.log.lock().spawned, 2);
        assert_eq!(spawner.log.lock().terminated, 1);
    }

    #[tokio::test]
    async fn test_async_lookup_resolves() {
        let h = harness(&[]);
        let spawner = h.spawner.clone();
        let lookup = h.lookup.clone();

        let pending = tokio::spawn(async move { lookup.net_filter_lookup("c", "||ads^").await });
        while spawner.lookup_ids().is_empty() {
            tokio::task::yield_now().await;
        }
        spawner.reply(1, "||ads^");

        let response = pending.await.unwrap().unwrap();
        assert_eq!(response.filter, "||ads^");
        assert_eq!(response.lists[0].title, "EasyList");
    }

    #[tokio::test]
    async fn test_async_lookup_after_teardown_is_none() {
        let h = harness(&[]);
        let spawner = h.spawner.clone();
        let lookup = h.lookup.clone();

        let pending = tokio::spawn(async move { lookup.cosmetic_filter_lookup("example.com", "##.ad").await });
        while spawner.lookup_ids().is_empty() {
            tokio::task::yield_now().await;
        }
        h.lookup.shutdown();

        assert!(pending.await.unwrap().is_none());
    }
}
