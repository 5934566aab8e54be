//! Supervisor: turns a configuration document into a running system.
//!
//! ```text
//!   Document ──▶ devices (tolerant factory) ──▶ Registry (+ _OnboardLED)
//!       │                                           │
//!       ├── events ──▶ EventTable ◀─────────────────┤ resolve
//!       ├── chains ──▶ [Chain] ◀────────────────────┘
//!       └── network? ──▶ Router: /<device>/<op>, /action/<name>, /docs, /logs
//!
//!   run(): one task per device + the API server, then idle forever
//! ```
//!
//! Every failure is contained to the smallest unit it belongs to: a
//! device that cannot be built is missing, a chain that cannot be resolved
//! is not routed, an event entry that cannot be resolved is not bound.

use std::net::SocketAddr;
use std::rc::Rc;

use log::{error, info, warn};
use serde_json::Map;

use crate::adapters::log_sink::LogBuffer;
use crate::api::router::{Handler, RouteDoc, RouteOptions, Router, handler_fn};
use crate::api::server;
use crate::app::device::Reply;
use crate::app::events::{Binder, Chain, EventTable};
use crate::app::ports::{Hardware, Notifier};
use crate::config::{Document, NetworkConfig};
use crate::devices::{BuildContext, Device, DeviceKind, ONBOARD_LED_NAME, Registry};
use crate::error::ConfigError;
use crate::scheduler::Runtime;

/// The collaborators a supervisor is built against.
#[derive(Clone)]
pub struct Environment {
    pub hardware: Rc<dyn Hardware>,
    pub notifier: Rc<dyn Notifier>,
    /// Ring of recent log lines, served at `/logs` when enabled.
    pub logs: Option<LogBuffer>,
}

pub struct Supervisor {
    network: Option<NetworkConfig>,
    registry: Registry,
    events: Rc<EventTable>,
    chains: Vec<Rc<Chain>>,
    router: Option<Rc<Router>>,
    runtime: Runtime,
}

impl Supervisor {
    /// Parse `text` and load it.  Fails only if the document as a whole is
    /// unreadable.
    pub fn from_json(text: &str, env: &Environment, runtime: Runtime) -> Result<Self, ConfigError> {
        Ok(Self::load(Document::parse(text)?, env, runtime))
    }

    pub fn load(doc: Document, env: &Environment, runtime: Runtime) -> Self {
        for e in &doc.errors {
            error!("config: {e}");
        }

        let ctx = BuildContext {
            hardware: env.hardware.as_ref(),
            clock: runtime.clock(),
        };
        let mut registry = Registry::new();
        for entry in &doc.devices {
            if let Some(device) = Device::try_build(entry, &ctx) {
                registry.insert(device);
            }
        }
        match Device::build(DeviceKind::OnboardLed, ONBOARD_LED_NAME, &Map::new(), &ctx) {
            Ok(led) => {
                registry.insert(led);
            }
            Err(e) => error!("`{ONBOARD_LED_NAME}` unavailable: {e}"),
        }

        let binder = Binder {
            registry: &registry,
            notifier: env.notifier.clone(),
        };
        let events = Rc::new(EventTable::build(&doc.events, &binder));
        let chains: Vec<Rc<Chain>> = doc
            .chains
            .iter()
            .filter_map(|(name, steps)| Chain::try_compile(name, steps, &binder))
            .map(Rc::new)
            .collect();

        let router = doc.network.as_ref().map(|network| {
            let router = build_router(network, &registry, &chains, env.logs.clone());
            info!("{} routes registered", router.len());
            Rc::new(router)
        });
        if router.is_none() && !chains.is_empty() {
            info!("no `network` section; {} chains are not routed", chains.len());
        }

        info!(
            "loaded {} devices, {} event bindings, {} chains",
            registry.len(),
            events.len(),
            chains.len()
        );

        Self {
            network: doc.network,
            registry,
            events,
            chains,
            router,
            runtime,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn events(&self) -> &Rc<EventTable> {
        &self.events
    }

    pub fn chains(&self) -> &[Rc<Chain>] {
        &self.chains
    }

    /// The route table, present when a `network` section was given.
    pub fn router(&self) -> Option<&Rc<Router>> {
        self.router.as_ref()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Spawn one perpetual task per device.
    pub fn start(&self) {
        for device in self.registry.iter() {
            let device = device.clone();
            let events = self.events.clone();
            let clock = self.runtime.clock().clone();
            self.runtime.spawn(async move { device.run_loop(&events, &clock).await });
        }
    }

    /// Start the device tasks and the API server, then idle.  Does not
    /// return.
    pub async fn run(self) {
        self.start();
        if let (Some(network), Some(router)) = (&self.network, &self.router) {
            match network
                .bind_addr()
                .parse::<SocketAddr>()
                .map_err(|e| e.to_string())
                .and_then(|addr| server::bind(addr).map_err(|e| e.to_string()))
            {
                Ok(listener) => self
                    .runtime
                    .spawn(server::serve(listener, router.clone(), self.runtime.clone())),
                Err(e) => error!("API server not started on {}: {e}", network.bind_addr()),
            }
        }
        futures_lite::future::pending::<()>().await;
    }
}

/// Register every device operation, every chain, and the built-in pages.
fn build_router(network: &NetworkConfig, registry: &Registry, chains: &[Rc<Chain>], logs: Option<LogBuffer>) -> Router {
    let mut router = Router::new();

    for device in registry.iter() {
        let name = device.name();
        for op in device.operations() {
            let id = router.register(&format!("/{name}/{}", op.name), device_handler(device, op.name), RouteOptions::API);
            router.describe(
                id,
                RouteDoc {
                    group: name.to_owned(),
                    group_summary: device.description().to_owned(),
                    summary: op.doc.to_owned(),
                    params: op.params,
                },
            );
        }
        if let Some(op) = device.default_operation() {
            let options = RouteOptions {
                documented: false,
                in_nav: false,
            };
            router.register(&format!("/{name}"), device_handler(device, op), options);
        }
    }

    for chain in chains {
        let name = chain.name();
        let id = router.register(&format!("/action/{name}"), chain_handler(chain), RouteOptions {
            documented: true,
            in_nav: true,
        });
        let steps: Vec<String> = chain.steps().iter().map(ToString::to_string).collect();
        router.describe(
            id,
            RouteDoc {
                group: "chains".into(),
                group_summary: String::new(),
                summary: format!("Runs {}.", steps.join(", ")),
                params: &[],
            },
        );
        let alias = RouteOptions {
            documented: false,
            in_nav: false,
        };
        router.register(&format!("/chain/{name}"), chain_handler(chain), alias);
    }

    if network.docs {
        router.register_docs();
    }
    if network.logs {
        match logs {
            Some(buffer) => {
                router.register_logs(buffer);
            }
            None => warn!("`/logs` enabled but the log buffer is off"),
        }
    }
    if network.docs {
        // Rendered once, after the last route is in.
        router.documentation();
    }
    router
}

fn device_handler(device: &Rc<Device>, op: &'static str) -> Handler {
    let device = device.clone();
    handler_fn(move |args| {
        let device = device.clone();
        Box::pin(async move { device.call(op, &args).await })
    })
}

fn chain_handler(chain: &Rc<Chain>) -> Handler {
    let chain = chain.clone();
    handler_fn(move |_| {
        let chain = chain.clone();
        Box::pin(async move {
            chain.run().await?;
            Ok(Reply::empty())
        })
    })
}
