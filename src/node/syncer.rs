//! Assembly and lifecycle of the whole replication process.
//!
//! [`Syncer::start`] builds every component from one [`SyncerConfig`], in
//! dependency order:
//! 1. shared stats and the ingest queue
//! 2. persistence workers, each with its own upstream connection
//! 3. the notification listener (connect + subscribe)
//! 4. the dispatcher and workers, then the listener receive loop
//! 5. admin command service and query agent, when enabled
//!
//! Any failure before step 4 is returned and nothing keeps running.
//! [`Syncer::stop`] tears down in the reverse direction of the data flow, so
//! that every key accepted by the pipeline is persisted before the store is
//! flushed.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;

use crate::admin::register_builtin_commands;
use crate::admin::CommandRegistry;
use crate::admin::CommandService;
use crate::agent::AgentServer;
use crate::pipeline::Listener;
use crate::pipeline::ListenerHandle;
use crate::pipeline::PipelineStats;
use crate::pipeline::Storer;
use crate::pipeline::StorerMgr;
use crate::pipeline::StorerMgrHandle;
use crate::storage::LocalStore;
use crate::upstream::UpstreamClient;
use crate::utils::async_task::spawn_task;
use crate::Result;
use crate::SyncerConfig;
use crate::UpstreamConfig;

pub struct Syncer<S: LocalStore> {
    store: Arc<S>,
    stats: Arc<PipelineStats>,
    registry: Arc<CommandRegistry>,

    listener: ListenerHandle,
    storers: StorerMgrHandle,

    // admin + agent share one stop signal
    frontend_shutdown: watch::Sender<()>,
    frontend_handles: Vec<(String, JoinHandle<()>)>,

    admin_addr: Option<SocketAddr>,
    agent_addr: Option<SocketAddr>,
}

impl<S: LocalStore> fmt::Debug for Syncer<S> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Syncer")
            .field("admin_addr", &self.admin_addr)
            .field("agent_addr", &self.agent_addr)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl<S: LocalStore> Syncer<S> {
    /// Starts every component.
    ///
    /// `new_client` is called once for the listener and once per shard; every
    /// component owns its connection.
    pub async fn start<C, F>(
        config: &SyncerConfig,
        store: Arc<S>,
        new_client: F,
    ) -> Result<Self>
    where
        C: UpstreamClient,
        F: Fn(&UpstreamConfig) -> C,
    {
        let shard_count = config.pipeline.shard_count;
        let stats = Arc::new(PipelineStats::new(shard_count));
        let (ingest_tx, ingest_rx) = mpsc::channel(config.pipeline.ingest_queue_capacity);

        let storers = (0..shard_count)
            .map(|id| {
                Storer::new(
                    id,
                    new_client(&config.upstream),
                    store.clone(),
                    config.retry.clone(),
                    config.upstream.apply_ttl,
                    stats.clone(),
                )
            })
            .collect();
        let mut mgr = StorerMgr::new(storers, config.pipeline.shard_queue_capacity, stats.clone());
        mgr.connect().await?;

        let mut listener = Listener::new(
            new_client(&config.upstream),
            &config.upstream,
            config.retry.listener,
            ingest_tx,
            stats.clone(),
        );
        listener.start().await?;

        // consumers first, so nothing the listener accepts is left waiting
        let storers = mgr.spawn(ingest_rx);
        let listener = listener.spawn();

        let registry = Arc::new(CommandRegistry::new());
        register_builtin_commands(&registry, stats.clone(), store.clone());

        let (frontend_shutdown, frontend_rx) = watch::channel(());
        let mut frontend_handles = Vec::new();
        let mut admin_addr = None;
        let mut agent_addr = None;

        let frontends = async {
            if config.admin.enabled {
                let service = CommandService::bind(config.admin.listen_address, registry.clone()).await?;
                admin_addr = Some(service.local_addr()?);
                let rx = frontend_rx.clone();
                spawn_task("admin", move || service.run(rx), Some(&mut frontend_handles));
            }
            if config.agent.enabled {
                let server = AgentServer::bind(&config.agent, store.clone()).await?;
                agent_addr = Some(server.local_addr()?);
                let rx = frontend_rx.clone();
                spawn_task("agent", move || server.run(rx), Some(&mut frontend_handles));
            }
            Ok::<(), crate::Error>(())
        }
        .await;

        let syncer = Self {
            store,
            stats,
            registry,
            listener,
            storers,
            frontend_shutdown,
            frontend_handles,
            admin_addr,
            agent_addr,
        };

        if let Err(e) = frontends {
            error!("front-end start failed: {:?}", e);
            if let Err(stop_err) = syncer.stop().await {
                error!("stop after failed start: {:?}", stop_err);
            }
            return Err(e);
        }

        info!(shards = shard_count, "syncer started");
        Ok(syncer)
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    pub fn agent_addr(&self) -> Option<SocketAddr> {
        self.agent_addr
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Registry served by the admin service; extra commands may be added at runtime
    pub fn registry(&self) -> Arc<CommandRegistry> {
        self.registry.clone()
    }

    pub fn store(&self) -> Arc<S> {
        self.store.clone()
    }

    /// Ordered shutdown: front-ends, listener, storer pool, then a store flush.
    ///
    /// Every step runs even if an earlier one failed; the first error is returned.
    pub async fn stop(self) -> Result<()> {
        info!("syncer stopping");
        let mut first_err = None;

        // receivers are gone when every front-end already exited
        let _ = self.frontend_shutdown.send(());
        for (name, handle) in self.frontend_handles {
            if let Err(e) = handle.await {
                error!("task {name} panicked: {:?}", e);
            }
        }

        // closes the ingest queue once the receive loop has exited
        if let Err(e) = self.listener.stop().await {
            error!("listener stop failed: {:?}", e);
            first_err.get_or_insert(e);
        }

        if let Err(e) = self.storers.stop().await {
            error!("storer pool stop failed: {:?}", e);
            first_err.get_or_insert(e);
        }

        if let Err(e) = self.store.flush() {
            error!("store flush failed: {:?}", e);
            first_err.get_or_insert(e);
        }

        info!(stats = %self.stats.snapshot(), "syncer stopped");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
