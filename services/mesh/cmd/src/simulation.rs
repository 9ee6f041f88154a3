//! A set of mesh nodes sharing one simulated radio medium.

use crate::config::{SimConfig, Topology};
use crate::{component_debug, component_info, component_warn};
use anyhow::Result;
use mesh_node::{Clock, MeshEvent, MeshNode, RecordingHandler, SimMedium, SimTransport};
use mesh_wire::NodeId;
use std::time::Duration;

/// Identifier of the simulated node at `index`
pub fn node_id(index: usize) -> NodeId {
    let [hi, lo] = (index as u16).to_be_bytes();
    NodeId::new([0x02, 0x00, 0x00, 0x00, hi, lo])
}

/// Nodes, their handlers, and the medium between them
pub struct Simulation<C: Clock> {
    medium: SimMedium,
    nodes: Vec<MeshNode<SimTransport, C>>,
    handlers: Vec<RecordingHandler>,
    ticks: u64,
}

impl<C: Clock + Clone> Simulation<C> {
    /// Build `config.nodes` nodes wired according to `config.topology`
    pub fn build(config: &SimConfig, clock: C) -> Result<Self> {
        let medium = SimMedium::new();
        let ids: Vec<NodeId> = (0..config.nodes).map(node_id).collect();

        let mut nodes = Vec::with_capacity(ids.len());
        let mut handlers = Vec::with_capacity(ids.len());
        for (index, id) in ids.iter().enumerate() {
            let mut node_config = config.node.clone();
            if let Some(seed) = config.node.rng_seed {
                node_config.rng_seed = Some(seed.wrapping_add(index as u64));
            }
            let mut node = medium.add_node(*id, node_config, clock.clone())?;
            let handler = RecordingHandler::new();
            node.set_handler(handler.clone());
            nodes.push(node);
            handlers.push(handler);
        }

        match config.topology {
            Topology::Chain => medium.chain(&ids),
            Topology::Ring => {
                medium.chain(&ids);
                if ids.len() > 2 {
                    medium.link(ids[0], ids[ids.len() - 1]);
                }
            }
            Topology::Full => {
                for (i, a) in ids.iter().enumerate() {
                    for b in &ids[i + 1..] {
                        medium.link(*a, *b);
                    }
                }
            }
        }

        component_info!(
            "sim",
            "Built {} nodes in a {:?} topology",
            nodes.len(),
            config.topology
        );
        Ok(Self {
            medium,
            nodes,
            handlers,
            ticks: 0,
        })
    }

    /// The shared medium
    pub fn medium(&self) -> &SimMedium {
        &self.medium
    }

    /// The simulated nodes, in index order
    pub fn nodes(&self) -> &[MeshNode<SimTransport, C>] {
        &self.nodes
    }

    /// Mutable access to the node at `index`
    pub fn node_mut(&mut self, index: usize) -> Option<&mut MeshNode<SimTransport, C>> {
        self.nodes.get_mut(index)
    }

    /// Ticks run so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Queue the configured demo traffic from the first node
    pub fn send_demo(&mut self, config: &SimConfig) -> Result<()> {
        let last = node_id(self.nodes.len().saturating_sub(1));
        let Some(first) = self.nodes.first_mut() else {
            return Ok(());
        };

        if let Some(text) = &config.demo.broadcast {
            let id = first.send_broadcast(text.as_bytes())?;
            component_info!("sim", "{} broadcasting {:?} as {}", first.node_id(), text, id);
        }
        if let Some(text) = &config.demo.unicast {
            let id = first.send_unicast(text.as_bytes(), last, config.demo.confirm)?;
            component_info!(
                "sim",
                "{} sending {:?} to {} as {} (confirm: {})",
                first.node_id(),
                text,
                last,
                id,
                config.demo.confirm
            );
        }
        Ok(())
    }

    /// Run one maintenance step on every node, then deliver the frames sent
    pub fn tick(&mut self) -> usize {
        for node in &mut self.nodes {
            node.maintenance();
        }
        let delivered = self.medium.pump();
        self.ticks += 1;
        self.report_events();
        delivered
    }

    /// Whether no node has anything left to do
    pub fn is_settled(&self) -> bool {
        self.medium.in_flight() == 0 && self.nodes.iter().all(|node| node.is_idle())
    }

    /// Tick every `interval` until `max_ticks` ran or, when it is 0, until the mesh settles
    pub async fn run(&mut self, max_ticks: u64, interval: Duration) -> u64 {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let start = self.ticks;
        loop {
            ticker.tick().await;
            let delivered = self.tick();
            component_debug!("sim", "Tick {} delivered {} frames", self.ticks, delivered);

            let ran = self.ticks - start;
            if max_ticks > 0 && ran >= max_ticks {
                break;
            }
            if max_ticks == 0 && self.is_settled() {
                component_info!("sim", "Mesh settled after {} ticks", ran);
                break;
            }
        }
        self.ticks - start
    }

    /// Log per-node counters and routes
    pub fn log_summary(&self) {
        for node in &self.nodes {
            let stats = node.stats();
            match serde_json::to_string(&stats) {
                Ok(json) => component_info!("stats", "{} {}", node.node_id(), json),
                Err(e) => component_warn!("stats", "Cannot encode stats of {}: {}", node.node_id(), e),
            }
            for route in node.routes() {
                component_info!("stats", "{} route {}", node.node_id(), route);
            }
        }
    }

    fn report_events(&self) {
        for (node, handler) in self.nodes.iter().zip(&self.handlers) {
            for event in handler.drain() {
                match event {
                    MeshEvent::Broadcast { payload, sender } => component_info!(
                        "app",
                        "{} got broadcast {:?} from {}",
                        node.node_id(),
                        String::from_utf8_lossy(&payload),
                        sender
                    ),
                    MeshEvent::Unicast { payload, sender } => component_info!(
                        "app",
                        "{} got unicast {:?} from {}",
                        node.node_id(),
                        String::from_utf8_lossy(&payload),
                        sender
                    ),
                    MeshEvent::Confirm {
                        destination,
                        message_id,
                        delivered: true,
                    } => component_info!(
                        "app",
                        "{} message {} to {} delivered",
                        node.node_id(),
                        message_id,
                        destination
                    ),
                    MeshEvent::Confirm {
                        destination,
                        message_id,
                        delivered: false,
                    } => component_warn!(
                        "app",
                        "{} message {} to {} not delivered",
                        node.node_id(),
                        message_id,
                        destination
                    ),
                }
            }
        }
    }
}
