use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, info};

use facet_connection::{ConnectionManager, ConnectionSite, ConnectionStatus};
use facet_store::{EntityStore, Invalidation};
use facet_subscribe::{SubscriptionHandle, SubscriptionRegistry, SubscriptionTarget};
use facet_types::{ConnectionArgs, ConnectionRef, EntityKey, EntityRecord, Payload, ViewRef};
use facet_view::{resolve_entity, resolve_keys, FieldSelection, MaskedValue, ViewDefinition};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::mutation::{MutationRequest, OptimisticJournal};
use crate::normalize::{normalize, NormalizedPage};
use crate::transport::Transport;

/// The client facade: one shared store, one connection manager, one
/// subscription registry, and one transport, wired together.
///
/// All read and subscribe calls are synchronous against the store; only
/// `query`, `load_next`, and `mutate` touch the transport. Optimistic
/// patches are applied before the first await, so every subscriber sees
/// them before the network round-trip begins.
pub struct FacetClient {
    transport: Arc<dyn Transport>,
    store: Arc<EntityStore>,
    connections: Arc<ConnectionManager>,
    subscriptions: Arc<SubscriptionRegistry>,
    journal: Mutex<OptimisticJournal>,
    config: ClientConfig,
    default_args: ConnectionArgs,
    root: EntityKey,
    active: AtomicBool,
}

impl FacetClient {
    pub fn new(transport: Arc<dyn Transport>) -> ClientResult<Self> {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: ClientConfig) -> ClientResult<Self> {
        let root = EntityKey::new(config.root_typename.clone(), config.root_id.clone())?;
        let default_args = config.default_args()?;
        info!(root = %root, "client created");
        Ok(Self {
            transport,
            store: Arc::new(EntityStore::new()),
            connections: Arc::new(ConnectionManager::new()),
            subscriptions: Arc::new(SubscriptionRegistry::new()),
            journal: Mutex::new(OptimisticJournal::new()),
            config,
            default_args,
            root,
            active: AtomicBool::new(true),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The underlying store. Exposed for integration points that merge
    /// externally produced data; normal consumers go through views.
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Tear the client down: drop every subscription and all cached state.
    /// Further operations fail with [`ClientError::TornDown`].
    pub fn teardown(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.subscriptions.clear();
            self.connections.clear();
            self.store.clear();
            info!("client torn down");
        }
    }

    // ---- queries ----------------------------------------------------------

    /// Issue an operation expected to resolve to a single root entity.
    ///
    /// The payload is normalized into the store; the returned ref is `None`
    /// when the operation resolved to nothing (e.g. no signed-in viewer).
    pub async fn query(
        &self,
        operation: &str,
        args: Value,
        view: &ViewDefinition,
    ) -> ClientResult<Option<ViewRef>> {
        self.ensure_active()?;
        let payload = self.transport.request(operation, args).await?;
        match &payload {
            Payload::Page(_) => Err(ClientError::UnexpectedPayload {
                operation: operation.to_string(),
                reason: "page payload for an entity query".to_string(),
            }),
            Payload::Empty => {
                debug!(operation, "query resolved to nothing");
                Ok(None)
            }
            Payload::Entity(_) => {
                let normalized = normalize(operation, &self.root, &payload)?;
                let root = normalized.root.clone();
                let mut signals = self.merge_patches(&normalized.patches);
                signals.extend(self.ingest_pages(normalized.pages, Some(view), None));
                self.fan_out(&signals);
                Ok(root.map(ViewRef::new))
            }
        }
    }

    /// Issue an operation expected to resolve to a paginated list.
    ///
    /// The first page is ingested and the logical list's ref returned.
    /// Repeating the call with the same args appends to the same list;
    /// different args start a fresh, independent one.
    pub async fn query_connection(
        &self,
        operation: &str,
        args: ConnectionArgs,
        item_view: &ViewDefinition,
    ) -> ClientResult<ConnectionRef> {
        self.ensure_active()?;
        let payload = self
            .transport
            .request(operation, args.to_request_args(None))
            .await?;
        if !matches!(payload, Payload::Page(_)) {
            return Err(ClientError::UnexpectedPayload {
                operation: operation.to_string(),
                reason: "expected a page payload".to_string(),
            });
        }
        let normalized = normalize(operation, &self.root, &payload)?;
        let mut signals = self.merge_patches(&normalized.patches);
        signals.extend(self.ingest_pages(normalized.pages, Some(item_view), Some(&args)));
        self.fan_out(&signals);
        Ok(ConnectionRef::new(operation, args))
    }

    /// Fetch the next page of a connection. Permitted only while the most
    /// recent page declared more data. Returns `true` if the accumulated
    /// key sequence changed.
    pub async fn load_next(
        &self,
        connection: &ConnectionRef,
        item_view: &ViewDefinition,
    ) -> ClientResult<bool> {
        self.ensure_active()?;
        let site = ConnectionSite::new(self.root.clone(), connection.operation());
        let cursor = self.connections.next_cursor(&site, connection.args())?;
        let payload = self
            .transport
            .request(
                connection.operation(),
                connection.args().to_request_args(Some(&cursor)),
            )
            .await?;
        if !matches!(payload, Payload::Page(_)) {
            return Err(ClientError::UnexpectedPayload {
                operation: connection.operation().to_string(),
                reason: "expected a page payload".to_string(),
            });
        }
        let normalized = normalize(connection.operation(), &self.root, &payload)?;
        let mut signals = self.merge_patches(&normalized.patches);
        signals.extend(self.ingest_pages(
            normalized.pages,
            Some(item_view),
            Some(connection.args()),
        ));
        let changed = signals.iter().any(|signal| {
            signal.key() == &self.root
                && signal.fields().iter().any(|f| f == connection.operation())
        });
        self.fan_out(&signals);
        Ok(changed)
    }

    // ---- reads ------------------------------------------------------------

    /// Resolve a ref through a view: exactly the declared fields.
    pub fn read(&self, view_ref: &ViewRef, view: &ViewDefinition) -> ClientResult<MaskedValue> {
        self.ensure_active()?;
        let resolved = resolve_entity(
            self.store.as_ref(),
            self.connections.as_ref(),
            view_ref,
            view,
        )?;
        Ok(resolved.value)
    }

    /// Resolve a connection's accumulated items through an item view.
    /// `Absent` before the first page.
    pub fn read_connection(
        &self,
        connection: &ConnectionRef,
        item_view: &ViewDefinition,
    ) -> ClientResult<MaskedValue> {
        self.ensure_active()?;
        let site = ConnectionSite::new(self.root.clone(), connection.operation());
        match self.connections.keys(&site, connection.args()) {
            Some(keys) => {
                let resolved = resolve_keys(
                    self.store.as_ref(),
                    self.connections.as_ref(),
                    &keys,
                    item_view,
                )?;
                Ok(resolved.value)
            }
            None => Ok(MaskedValue::Absent),
        }
    }

    pub fn connection_status(&self, connection: &ConnectionRef) -> ConnectionStatus {
        let site = ConnectionSite::new(self.root.clone(), connection.operation());
        self.connections.status(&site, connection.args())
    }

    pub fn can_load_next(&self, connection: &ConnectionRef) -> bool {
        let site = ConnectionSite::new(self.root.clone(), connection.operation());
        self.connections.can_load_next(&site, connection.args())
    }

    /// Remove an entity and notify every subscription depending on it;
    /// views holding its ref observe `Absent` afterwards. Returns `false`
    /// if the key was not present.
    pub fn delete(&self, key: &EntityKey) -> ClientResult<bool> {
        self.ensure_active()?;
        match self.store.delete(key) {
            Some(signal) => {
                self.fan_out(&[signal]);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ---- subscriptions ----------------------------------------------------

    /// Subscribe to a ref through a view. The current value is returned
    /// immediately; the callback fires on every later change to a field the
    /// view depends on, transitively through nested refs.
    pub fn subscribe<F>(
        &self,
        view_ref: ViewRef,
        view: ViewDefinition,
        callback: F,
    ) -> ClientResult<(SubscriptionHandle, MaskedValue)>
    where
        F: Fn(&MaskedValue) + Send + Sync + 'static,
    {
        self.ensure_active()?;
        let target = SubscriptionTarget::Entity { view_ref, view };
        let (id, value) = self.subscriptions.subscribe(
            self.store.as_ref(),
            self.connections.as_ref(),
            target,
            callback,
        )?;
        Ok((SubscriptionHandle::new(&self.subscriptions, id), value))
    }

    /// Subscribe to a connection's item sequence. Fires when a page is
    /// appended and when any declared field of any listed item changes.
    pub fn subscribe_connection<F>(
        &self,
        connection: &ConnectionRef,
        item_view: ViewDefinition,
        callback: F,
    ) -> ClientResult<(SubscriptionHandle, MaskedValue)>
    where
        F: Fn(&MaskedValue) + Send + Sync + 'static,
    {
        self.ensure_active()?;
        let target = SubscriptionTarget::Connection {
            parent: self.root.clone(),
            field: connection.operation().to_string(),
            args: connection.args().clone(),
            item_view,
        };
        let (id, value) = self.subscriptions.subscribe(
            self.store.as_ref(),
            self.connections.as_ref(),
            target,
            callback,
        )?;
        Ok((SubscriptionHandle::new(&self.subscriptions, id), value))
    }

    // ---- mutations --------------------------------------------------------

    /// Run one mutation: optimistic apply, transport call, reconcile or
    /// rollback. On success the response's root entity is masked through
    /// the request's view, when one was given.
    pub async fn mutate(&self, request: MutationRequest) -> ClientResult<MaskedValue> {
        self.ensure_active()?;
        let MutationRequest {
            operation,
            input,
            optimistic,
            view,
        } = request;

        let entry = if optimistic.is_empty() {
            None
        } else {
            let (id, signals) = self
                .journal
                .lock()
                .expect("lock poisoned")
                .begin(self.store.as_ref(), optimistic);
            self.fan_out(&signals);
            Some(id)
        };

        match self.transport.request(&operation, input).await {
            Ok(payload) => {
                // A malformed payload settles the mutation like a transport
                // failure: the entry must not stay pending with its
                // provisional patch applied.
                let normalized = match normalize(&operation, &self.root, &payload) {
                    Ok(normalized) => normalized,
                    Err(error) => {
                        if let Some(id) = entry {
                            let signals = self
                                .journal
                                .lock()
                                .expect("lock poisoned")
                                .rollback(self.store.as_ref(), id);
                            self.fan_out(&signals);
                        }
                        return Err(error.into());
                    }
                };
                let root = normalized.root.clone();
                let mut signals = match entry {
                    Some(id) => self.journal.lock().expect("lock poisoned").commit(
                        self.store.as_ref(),
                        id,
                        normalized.patches,
                    ),
                    None => self.merge_patches(&normalized.patches),
                };
                signals.extend(self.ingest_pages(normalized.pages, view.as_ref(), None));
                self.fan_out(&signals);

                match (view, root) {
                    (Some(view), Some(root)) => {
                        let resolved = resolve_entity(
                            self.store.as_ref(),
                            self.connections.as_ref(),
                            &ViewRef::new(root),
                            &view,
                        )?;
                        Ok(resolved.value)
                    }
                    _ => Ok(MaskedValue::Absent),
                }
            }
            Err(error) => {
                if let Some(id) = entry {
                    let signals = self
                        .journal
                        .lock()
                        .expect("lock poisoned")
                        .rollback(self.store.as_ref(), id);
                    self.fan_out(&signals);
                }
                Err(error.into())
            }
        }
    }

    // ---- internals --------------------------------------------------------

    fn ensure_active(&self) -> ClientResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(ClientError::TornDown)
        }
    }

    fn merge_patches(&self, patches: &[(EntityKey, EntityRecord)]) -> Vec<Invalidation> {
        patches
            .iter()
            .map(|(key, patch)| self.store.merge_keyed(key, patch))
            .collect()
    }

    /// Ingest normalized pages. Nested pages look their pagination args up
    /// in the view that requested them; root pages use the explicit args of
    /// the issuing call.
    fn ingest_pages(
        &self,
        pages: Vec<NormalizedPage>,
        view: Option<&ViewDefinition>,
        root_args: Option<&ConnectionArgs>,
    ) -> Vec<Invalidation> {
        let mut declared: HashMap<(String, String), ConnectionArgs> = HashMap::new();
        if let Some(view) = view {
            index_list_args(view, &mut declared);
        }

        let mut signals = Vec::new();
        for page in pages {
            let args = if page.parent == self.root {
                root_args.unwrap_or(&self.default_args).clone()
            } else {
                declared
                    .get(&(page.parent.typename().to_string(), page.field.clone()))
                    .unwrap_or(&self.default_args)
                    .clone()
            };
            let site = ConnectionSite::new(page.parent.clone(), page.field.clone());
            let changed = self
                .connections
                .ingest_page(&site, &args, page.keys, &page.page_info);
            if changed {
                // The key sequence is signaled as a field of the parent.
                signals.push(Invalidation::new(page.parent, vec![page.field]));
            }
        }
        signals
    }

    fn fan_out(&self, signals: &[Invalidation]) {
        for signal in signals {
            if signal.is_empty() {
                continue;
            }
            self.subscriptions
                .fan_out(self.store.as_ref(), self.connections.as_ref(), signal);
        }
    }
}

impl fmt::Debug for FacetClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FacetClient")
            .field("active", &self.is_active())
            .field("record_count", &self.store.len())
            .field("connection_count", &self.connections.len())
            .field("subscription_count", &self.subscriptions.len())
            .finish()
    }
}

/// Collect the pagination args every list field in a view tree declares,
/// keyed by `(typename, field)`.
fn index_list_args(view: &ViewDefinition, out: &mut HashMap<(String, String), ConnectionArgs>) {
    for (field, selection) in view.fields() {
        match selection {
            FieldSelection::Nested(sub) => index_list_args(sub, out),
            FieldSelection::List(list) => {
                out.insert(
                    (view.typename().to_string(), field.to_string()),
                    list.args.clone(),
                );
                index_list_args(&list.view, out);
            }
            FieldSelection::Scalar | FieldSelection::Resolver(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::oneshot;

    use facet_store::EntityReader;
    use facet_types::{ConnectionPage, EntityFragment, FieldValue, PageInfo};

    use crate::error::TransportError;

    use super::*;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    // ---- test doubles -----------------------------------------------------

    /// Replies with scripted responses in order, recording each request.
    struct ScriptedTransport {
        responses: StdMutex<VecDeque<Result<Payload, TransportError>>>,
        requests: StdMutex<Vec<(String, Value)>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<Payload, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: StdMutex::new(responses.into()),
                requests: StdMutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<(String, Value)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn request(&self, operation: &str, args: Value) -> Result<Payload, TransportError> {
            self.requests
                .lock()
                .unwrap()
                .push((operation.to_string(), args));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(TransportError::Network("script exhausted".into())))
        }
    }

    /// Holds each request until the test releases its response, keyed by
    /// operation name. Lets tests control settle order precisely.
    struct GatedTransport {
        gates: StdMutex<HashMap<String, oneshot::Receiver<Result<Payload, TransportError>>>>,
    }

    impl GatedTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                gates: StdMutex::new(HashMap::new()),
            })
        }

        fn gate(&self, operation: &str) -> oneshot::Sender<Result<Payload, TransportError>> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().insert(operation.to_string(), rx);
            tx
        }
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn request(&self, operation: &str, _args: Value) -> Result<Payload, TransportError> {
            let rx = self
                .gates
                .lock()
                .unwrap()
                .remove(operation)
                .expect("no gate for operation");
            rx.await.expect("gate sender dropped")
        }
    }

    // ---- fixtures ---------------------------------------------------------

    fn key(typename: &str, id: &str) -> EntityKey {
        EntityKey::new(typename, id).unwrap()
    }

    fn post_fragment(id: &str, likes: i64) -> EntityFragment {
        EntityFragment::new("Post", id)
            .with_scalar("id", id)
            .with_scalar("likes", likes)
    }

    fn post_view(fields: &[&str]) -> ViewDefinition {
        let mut builder = ViewDefinition::builder("Post");
        for field in fields {
            builder = builder.scalar(*field);
        }
        builder.build().unwrap()
    }

    fn likes_patch(n: i64) -> EntityRecord {
        EntityRecord::new().with_field("likes", FieldValue::scalar(n))
    }

    fn page(ids: &[&str], has_next: bool, cursor: Option<&str>) -> Payload {
        Payload::Page(ConnectionPage::new(
            ids.iter().map(|id| post_fragment(id, 0)).collect(),
            PageInfo {
                has_next,
                end_cursor: cursor.map(str::to_string),
            },
        ))
    }

    fn stored_likes(client: &FacetClient) -> Option<Value> {
        client
            .store()
            .record(&key("Post", "1"))
            .and_then(|r| r.get("likes").and_then(FieldValue::as_scalar).cloned())
    }

    // ---- queries ----------------------------------------------------------

    #[tokio::test]
    async fn query_normalizes_nested_entities() {
        init_tracing();
        let payload = Payload::Entity(
            post_fragment("1", 5)
                .with_scalar("secret", "hidden")
                .with_entity("author", EntityFragment::new("User", "9").with_scalar("name", "ada")),
        );
        let transport = ScriptedTransport::new(vec![Ok(payload)]);
        let client = FacetClient::new(transport).unwrap();

        let view_ref = client
            .query("post", json!({"id": "1"}), &post_view(&["id", "likes"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(view_ref.key(), &key("Post", "1"));

        // The author was normalized into its own record.
        let author = client.store().record(&key("User", "9")).unwrap();
        assert_eq!(author.get("name"), Some(&FieldValue::scalar("ada")));

        // Masking is an exact projection: no undeclared fields leak through.
        let value = client.read(&view_ref, &post_view(&["id", "likes"])).unwrap();
        let entity = value.as_entity().unwrap();
        assert_eq!(entity.scalar("likes"), Some(&Value::from(5)));
        assert!(entity.get("secret").is_none());
        assert!(entity.get("author").is_none());
    }

    #[tokio::test]
    async fn empty_query_resolves_to_none() {
        let transport = ScriptedTransport::new(vec![Ok(Payload::Empty)]);
        let client = FacetClient::new(transport).unwrap();

        let result = client
            .query("viewer", json!({}), &post_view(&["id"]))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn entity_query_rejects_page_payload() {
        let transport = ScriptedTransport::new(vec![Ok(page(&["1"], false, None))]);
        let client = FacetClient::new(transport).unwrap();

        let result = client.query("post", json!({}), &post_view(&["id"])).await;
        assert!(matches!(
            result,
            Err(ClientError::UnexpectedPayload { .. })
        ));
    }

    // ---- pagination -------------------------------------------------------

    #[tokio::test]
    async fn load_next_appends_and_sends_cursor() {
        let transport = ScriptedTransport::new(vec![
            Ok(page(&["1", "2"], true, Some("c1"))),
            Ok(page(&["2", "3"], false, None)),
        ]);
        let client = FacetClient::new(Arc::clone(&transport) as Arc<dyn Transport>).unwrap();
        let args = ConnectionArgs::new(2).unwrap();
        let view = post_view(&["id"]);

        let connection = client.query_connection("posts", args, &view).await.unwrap();
        assert!(client.can_load_next(&connection));

        let changed = client.load_next(&connection, &view).await.unwrap();
        assert!(changed);
        assert_eq!(
            client.connection_status(&connection),
            ConnectionStatus::Exhausted
        );

        // Duplicate Post:2 collapsed to its first position.
        let items = client.read_connection(&connection, &view).unwrap();
        let ids: Vec<_> = items
            .as_list()
            .unwrap()
            .iter()
            .map(|item| item.as_entity().unwrap().key().id().to_string())
            .collect();
        assert_eq!(ids, ["1", "2", "3"]);

        // The second request carried the continuation cursor.
        let requests = transport.requests();
        assert!(requests[0].1.get("after").is_none());
        assert_eq!(requests[1].1["after"], Value::from("c1"));

        // No further pages to load.
        assert!(matches!(
            client.load_next(&connection, &view).await,
            Err(ClientError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn changed_args_read_as_a_fresh_list() {
        let transport = ScriptedTransport::new(vec![
            Ok(page(&["1", "2"], false, None)),
            Ok(page(&["9"], false, None)),
        ]);
        let client = FacetClient::new(transport).unwrap();
        let view = post_view(&["id"]);
        let all = ConnectionArgs::new(2).unwrap();
        let filtered = ConnectionArgs::new(2).unwrap().with_filter("query", "rust");

        let first = client
            .query_connection("posts", all, &view)
            .await
            .unwrap();
        let second = client
            .query_connection("posts", filtered, &view)
            .await
            .unwrap();

        assert_eq!(client.read_connection(&first, &view).unwrap().as_list().unwrap().len(), 2);
        assert_eq!(client.read_connection(&second, &view).unwrap().as_list().unwrap().len(), 1);
    }

    // ---- optimistic mutations ---------------------------------------------

    #[tokio::test]
    async fn optimistic_round_trip_matches_direct_merge() {
        init_tracing();
        let transport =
            ScriptedTransport::new(vec![Ok(Payload::Entity(post_fragment("1", 6)))]);
        let client = FacetClient::new(transport).unwrap();
        client.store().merge("Post", "1", &likes_patch(5)).unwrap();

        let request = MutationRequest::new("likePost", json!({"id": "1"}))
            .with_optimistic(key("Post", "1"), likes_patch(6));
        client.mutate(request).await.unwrap();

        // Baseline: the same data merged directly, no optimistic detour.
        let baseline = EntityStore::new();
        baseline.merge("Post", "1", &likes_patch(5)).unwrap();
        baseline
            .merge("Post", "1", &EntityRecord::new().with_field("id", FieldValue::scalar("1")))
            .unwrap();
        baseline.merge("Post", "1", &likes_patch(6)).unwrap();

        assert_eq!(
            client.store().record(&key("Post", "1")),
            baseline.record(&key("Post", "1"))
        );
    }

    #[tokio::test]
    async fn rejected_mutation_rolls_back_exactly() {
        init_tracing();
        let transport = ScriptedTransport::new(vec![Err(TransportError::Validation(
            "likes capped".into(),
        ))]);
        let client = FacetClient::new(transport).unwrap();
        client.store().merge("Post", "1", &likes_patch(5)).unwrap();

        let request = MutationRequest::new("likePost", json!({"id": "1"}))
            .with_optimistic(key("Post", "1"), likes_patch(6));
        let error = client.mutate(request).await.unwrap_err();

        // The server's message passes through untouched.
        assert!(matches!(error, ClientError::Validation(ref m) if m == "likes capped"));
        assert_eq!(stored_likes(&client), Some(Value::from(5)));
    }

    #[tokio::test]
    async fn mutation_response_is_masked_through_the_view() {
        let transport = ScriptedTransport::new(vec![Ok(Payload::Entity(
            post_fragment("1", 6).with_scalar("secret", "x"),
        ))]);
        let client = FacetClient::new(transport).unwrap();

        let request = MutationRequest::new("likePost", json!({"id": "1"}))
            .with_view(post_view(&["likes"]));
        let value = client.mutate(request).await.unwrap();

        let entity = value.as_entity().unwrap();
        assert_eq!(entity.scalar("likes"), Some(&Value::from(6)));
        assert!(entity.get("secret").is_none());
    }

    #[tokio::test]
    async fn first_rejected_second_accepted_keeps_second_value() {
        init_tracing();
        let transport = GatedTransport::new();
        let first_gate = transport.gate("like1");
        let second_gate = transport.gate("like2");
        let client =
            Arc::new(FacetClient::new(Arc::clone(&transport) as Arc<dyn Transport>).unwrap());
        client.store().merge("Post", "1", &likes_patch(5)).unwrap();

        let first = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .mutate(
                        MutationRequest::new("like1", json!({}))
                            .with_optimistic(key("Post", "1"), likes_patch(6)),
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;
        let second = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .mutate(
                        MutationRequest::new("like2", json!({}))
                            .with_optimistic(key("Post", "1"), likes_patch(7)),
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;

        // Both optimistic patches applied; latest wins while in flight.
        assert_eq!(stored_likes(&client), Some(Value::from(7)));

        // Second settles first with its authoritative value, then the first
        // is rejected and rolled back.
        second_gate
            .send(Ok(Payload::Entity(post_fragment("1", 7))))
            .unwrap();
        second.await.unwrap().unwrap();
        first_gate
            .send(Err(TransportError::Validation("rejected".into())))
            .unwrap();
        assert!(first.await.unwrap().is_err());

        assert_eq!(stored_likes(&client), Some(Value::from(7)));
    }

    #[tokio::test]
    async fn malformed_response_rolls_back_optimistic_patch() {
        // An un-keyable fragment in an otherwise successful response must
        // settle the mutation: revert the patch, surface the error once.
        let transport = ScriptedTransport::new(vec![
            Ok(Payload::Entity(EntityFragment::new("Post", ""))),
            Err(TransportError::Validation("no".into())),
        ]);
        let client = FacetClient::new(transport).unwrap();
        client.store().merge("Post", "1", &likes_patch(5)).unwrap();

        let request = MutationRequest::new("likePost", json!({"id": "1"}))
            .with_optimistic(key("Post", "1"), likes_patch(6));
        let error = client.mutate(request).await.unwrap_err();

        assert!(matches!(error, ClientError::Type(_)));
        assert_eq!(stored_likes(&client), Some(Value::from(5)));

        // The entry settled; a later rejected mutation's rollback does not
        // replay the stranded patch.
        assert!(client
            .mutate(
                MutationRequest::new("likePost", json!({}))
                    .with_optimistic(key("Post", "1"), likes_patch(7)),
            )
            .await
            .is_err());
        assert_eq!(stored_likes(&client), Some(Value::from(5)));
    }

    #[tokio::test]
    async fn rollback_removes_placeholder_entity() {
        let transport = ScriptedTransport::new(vec![Err(TransportError::Network(
            "offline".into(),
        ))]);
        let client = FacetClient::new(transport).unwrap();

        let placeholder = key("Comment", "optimistic-1");
        let request = MutationRequest::new("addComment", json!({"text": "hi"})).with_optimistic(
            placeholder.clone(),
            EntityRecord::new().with_field("text", FieldValue::scalar("hi")),
        );

        assert!(client.mutate(request).await.is_err());
        assert!(!client.store().contains(&placeholder));
    }

    // ---- subscriptions ----------------------------------------------------

    #[tokio::test]
    async fn subscription_sees_optimistic_patch_before_settle() {
        let transport = GatedTransport::new();
        let gate = transport.gate("likePost");
        let client =
            Arc::new(FacetClient::new(Arc::clone(&transport) as Arc<dyn Transport>).unwrap());
        client.store().merge("Post", "1", &likes_patch(5)).unwrap();

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let (_handle, initial) = client
            .subscribe(
                ViewRef::new(key("Post", "1")),
                post_view(&["likes"]),
                move |value| {
                    if let Some(entity) = value.as_entity() {
                        sink.lock().unwrap().push(entity.scalar("likes").cloned());
                    }
                },
            )
            .unwrap();
        assert_eq!(
            initial.as_entity().unwrap().scalar("likes"),
            Some(&Value::from(5))
        );

        let task = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .mutate(
                        MutationRequest::new("likePost", json!({}))
                            .with_optimistic(key("Post", "1"), likes_patch(6)),
                    )
                    .await
            })
        };
        tokio::task::yield_now().await;

        // The optimistic value was observed before the transport settled.
        assert_eq!(seen.lock().unwrap().as_slice(), [Some(Value::from(6))]);

        gate.send(Ok(Payload::Entity(post_fragment("1", 6)))).unwrap();
        task.await.unwrap().unwrap();
        // Authoritative value equals the optimistic one: no second call.
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn subscriber_ignores_undeclared_fields() {
        let transport = ScriptedTransport::new(vec![
            Ok(Payload::Entity(post_fragment("1", 6))),
            Ok(Payload::Entity(
                EntityFragment::new("Post", "1").with_scalar("name", "renamed"),
            )),
        ]);
        let client = FacetClient::new(transport).unwrap();
        client
            .store()
            .merge(
                "Post",
                "1",
                &EntityRecord::new()
                    .with_field("id", FieldValue::scalar("1"))
                    .with_field("name", FieldValue::scalar("first"))
                    .with_field("likes", FieldValue::scalar(5)),
            )
            .unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&count);
        let (_handle, _) = client
            .subscribe(
                ViewRef::new(key("Post", "1")),
                post_view(&["id", "name"]),
                move |_| {
                    sink.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();

        // A likes change is invisible to an {id, name} subscriber.
        client
            .mutate(MutationRequest::new("likePost", json!({})))
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // A name change is not.
        client
            .mutate(MutationRequest::new("renamePost", json!({})))
            .await
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn late_response_after_unsubscribe_merges_silently() {
        let transport = GatedTransport::new();
        let gate = transport.gate("renamePost");
        let client =
            Arc::new(FacetClient::new(Arc::clone(&transport) as Arc<dyn Transport>).unwrap());
        client
            .store()
            .merge(
                "Post",
                "1",
                &EntityRecord::new().with_field("name", FieldValue::scalar("first")),
            )
            .unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&count);
        let (handle, _) = client
            .subscribe(
                ViewRef::new(key("Post", "1")),
                post_view(&["name"]),
                move |_| {
                    sink.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();

        let task = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .mutate(MutationRequest::new("renamePost", json!({})))
                    .await
            })
        };
        tokio::task::yield_now().await;

        // Unsubscribe while the response is still in flight.
        assert!(handle.unsubscribe());
        gate.send(Ok(Payload::Entity(
            EntityFragment::new("Post", "1").with_scalar("name", "renamed"),
        )))
        .unwrap();
        task.await.unwrap().unwrap();

        // The data still landed; the dead callback never fired.
        let record = client.store().record(&key("Post", "1")).unwrap();
        assert_eq!(record.get("name"), Some(&FieldValue::scalar("renamed")));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn connection_subscription_fires_on_page_append() {
        let transport = ScriptedTransport::new(vec![
            Ok(page(&["1"], true, Some("c1"))),
            Ok(page(&["2"], false, None)),
        ]);
        let client = FacetClient::new(transport).unwrap();
        let view = post_view(&["id"]);
        let args = ConnectionArgs::new(1).unwrap();

        let connection = client
            .query_connection("posts", args, &view)
            .await
            .unwrap();

        let lengths = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&lengths);
        let (_handle, initial) = client
            .subscribe_connection(&connection, view.clone(), move |value| {
                if let Some(items) = value.as_list() {
                    sink.lock().unwrap().push(items.len());
                }
            })
            .unwrap();
        assert_eq!(initial.as_list().unwrap().len(), 1);

        client.load_next(&connection, &view).await.unwrap();
        assert_eq!(lengths.lock().unwrap().as_slice(), [2]);
    }

    #[tokio::test]
    async fn delete_notifies_dependents_with_absent() {
        let transport = ScriptedTransport::new(vec![]);
        let client = FacetClient::new(transport).unwrap();
        client.store().merge("Post", "1", &likes_patch(5)).unwrap();

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let (_handle, _) = client
            .subscribe(
                ViewRef::new(key("Post", "1")),
                post_view(&["likes"]),
                move |value| {
                    sink.lock().unwrap().push(value.is_absent());
                },
            )
            .unwrap();

        assert!(client.delete(&key("Post", "1")).unwrap());
        assert_eq!(seen.lock().unwrap().as_slice(), [true]);
        assert!(!client.delete(&key("Post", "1")).unwrap());
    }

    // ---- lifecycle --------------------------------------------------------

    #[tokio::test]
    async fn teardown_stops_all_operations() {
        let transport = ScriptedTransport::new(vec![Ok(Payload::Empty)]);
        let client = FacetClient::new(transport).unwrap();
        client.store().merge("Post", "1", &likes_patch(5)).unwrap();

        client.teardown();
        assert!(!client.is_active());
        assert!(client.store().is_empty());

        assert!(matches!(
            client.query("post", json!({}), &post_view(&["id"])).await,
            Err(ClientError::TornDown)
        ));
        assert!(matches!(
            client.mutate(MutationRequest::new("likePost", json!({}))).await,
            Err(ClientError::TornDown)
        ));
        assert!(matches!(
            client.read(&ViewRef::new(key("Post", "1")), &post_view(&["id"])),
            Err(ClientError::TornDown)
        ));
    }
}
