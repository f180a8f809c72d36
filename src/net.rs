//! [`Libp2pSubstrate`]: a concrete [`Substrate`] over libp2p, providing the
//! peer-discovery/group-messaging primitives the control plane needs
//! (ENTER/EXIT via mDNS, group SHOUT via gossipsub, unicast WHISPER via
//! request-response).
//!
//! The control-plane logic in [`crate::node`] never depends on this module;
//! it is one interchangeable implementation of [`Substrate`], the same way
//! [`crate::substrate::mock`] is another. One `NetworkBehaviour` derive
//! wraps several libp2p sub-behaviours and their events are drained by
//! hand.

use crate::id::PeerId;
use crate::substrate::{InboxEvent, Substrate};
use async_trait::async_trait;
use futures::stream::StreamExt;
use libp2p::gossipsub::{
    Gossipsub, GossipsubConfig, GossipsubEvent, IdentTopic as Topic, MessageAuthenticity,
};
use libp2p::identify::{Identify, IdentifyConfig, IdentifyEvent};
use libp2p::mdns::{Mdns, MdnsConfig, MdnsEvent};
use libp2p::request_response::{
    ProtocolName, ProtocolSupport, RequestResponse, RequestResponseCodec, RequestResponseConfig,
    RequestResponseEvent, RequestResponseMessage,
};
use libp2p::swarm::NetworkBehaviourEventProcess;
use libp2p::{NetworkBehaviour, Swarm};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;

/// Wire packet exchanged over the `/ocp/hello/1.0.0` request-response
/// protocol: a handshake (exchanged once per newly discovered peer, to
/// learn its display name and advertised headers, neither of which libp2p
/// itself carries) and a plain whisper envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
enum Packet {
    Hello {
        name: String,
        headers: HashMap<String, String>,
    },
    Whisper(Vec<u8>),
    Ack,
}

#[derive(Clone)]
struct OcpProtocol;

impl ProtocolName for OcpProtocol {
    fn protocol_name(&self) -> &[u8] {
        b"/ocp/hello/1.0.0"
    }
}

#[derive(Clone, Default)]
struct OcpCodec;

#[async_trait]
impl RequestResponseCodec for OcpCodec {
    type Protocol = OcpProtocol;
    type Request = Packet;
    type Response = Packet;

    async fn read_request<T>(&mut self, _: &OcpProtocol, io: &mut T) -> io::Result<Packet>
    where
        T: futures::io::AsyncRead + Unpin + Send,
    {
        read_packet(io).await
    }

    async fn read_response<T>(&mut self, _: &OcpProtocol, io: &mut T) -> io::Result<Packet>
    where
        T: futures::io::AsyncRead + Unpin + Send,
    {
        read_packet(io).await
    }

    async fn write_request<T>(
        &mut self,
        _: &OcpProtocol,
        io: &mut T,
        req: Packet,
    ) -> io::Result<()>
    where
        T: futures::io::AsyncWrite + Unpin + Send,
    {
        write_packet(io, &req).await
    }

    async fn write_response<T>(
        &mut self,
        _: &OcpProtocol,
        io: &mut T,
        res: Packet,
    ) -> io::Result<()>
    where
        T: futures::io::AsyncWrite + Unpin + Send,
    {
        write_packet(io, &res).await
    }
}

async fn read_packet<T>(io: &mut T) -> io::Result<Packet>
where
    T: futures::io::AsyncRead + Unpin + Send,
{
    use futures::io::AsyncReadExt;
    let mut buf = Vec::new();
    io.read_to_end(&mut buf).await?;
    serde_json::from_slice(&buf).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

async fn write_packet<T>(io: &mut T, packet: &Packet) -> io::Result<()>
where
    T: futures::io::AsyncWrite + Unpin + Send,
{
    use futures::io::AsyncWriteExt;
    let bytes = serde_json::to_vec(packet)?;
    io.write_all(&bytes).await?;
    io.close().await
}

type HelloBehaviour = RequestResponse<OcpCodec>;

#[derive(NetworkBehaviour)]
#[behaviour(event_process = true)]
struct OcpBehaviour {
    mdns: Mdns,
    identify: Identify,
    gossipsub: Gossipsub,
    hello: HelloBehaviour,
    #[behaviour(ignore)]
    pending: VecDeque<InboxEvent>,
    #[behaviour(ignore)]
    peer_names: HashMap<libp2p::PeerId, (PeerId, String)>,
    #[behaviour(ignore)]
    peer_headers: HashMap<PeerId, HashMap<String, String>>,
    #[behaviour(ignore)]
    peer_groups: HashMap<PeerId, HashSet<String>>,
    #[behaviour(ignore)]
    local_id: PeerId,
    #[behaviour(ignore)]
    local_name: String,
    #[behaviour(ignore)]
    local_headers: HashMap<String, String>,
}

impl OcpBehaviour {
    fn say_hello(&mut self, peer: &libp2p::PeerId) {
        self.hello.send_request(
            peer,
            Packet::Hello {
                name: self.local_name.clone(),
                headers: self.local_headers.clone(),
            },
        );
    }

    fn register_peer(&mut self, lp_peer: libp2p::PeerId, name: String, headers: HashMap<String, String>) {
        let ocp_peer = derive_peer_id(&lp_peer);
        let is_new = !self.peer_names.contains_key(&lp_peer);
        self.peer_names.insert(lp_peer, (ocp_peer, name.clone()));
        self.peer_headers.insert(ocp_peer, headers);
        if is_new {
            self.pending.push_back(InboxEvent::Enter {
                peer: ocp_peer,
                name,
            });
        }
    }
}

impl NetworkBehaviourEventProcess<MdnsEvent> for OcpBehaviour {
    fn inject_event(&mut self, event: MdnsEvent) {
        match event {
            MdnsEvent::Discovered(list) => {
                for (peer, _addr) in list {
                    if !self.peer_names.contains_key(&peer) {
                        self.say_hello(&peer);
                    }
                }
            }
            MdnsEvent::Expired(list) => {
                for (peer, _addr) in list {
                    if let Some((ocp_peer, name)) = self.peer_names.remove(&peer) {
                        self.peer_headers.remove(&ocp_peer);
                        self.peer_groups.remove(&ocp_peer);
                        self.pending.push_back(InboxEvent::Exit {
                            peer: ocp_peer,
                            name,
                        });
                    }
                }
            }
        }
    }
}

impl NetworkBehaviourEventProcess<IdentifyEvent> for OcpBehaviour {
    fn inject_event(&mut self, event: IdentifyEvent) {
        if let IdentifyEvent::Received { peer_id, info } = event {
            tracing::debug!("identify: {} running {}", peer_id, info.agent_version);
        }
    }
}

impl NetworkBehaviourEventProcess<GossipsubEvent> for OcpBehaviour {
    fn inject_event(&mut self, event: GossipsubEvent) {
        match event {
            GossipsubEvent::Message {
                propagation_source,
                message,
                ..
            } => {
                if let Some((peer, name)) = self.peer_names.get(&propagation_source).cloned() {
                    self.pending.push_back(InboxEvent::Shout {
                        peer,
                        name,
                        group: message.topic.into_string(),
                        payload: message.data,
                    });
                }
            }
            GossipsubEvent::Subscribed { peer_id, topic } => {
                if let Some((peer, name)) = self.peer_names.get(&peer_id).cloned() {
                    self.peer_groups
                        .entry(peer)
                        .or_default()
                        .insert(topic.to_string());
                    self.pending.push_back(InboxEvent::Join {
                        peer,
                        name,
                        group: topic.into_string(),
                    });
                }
            }
            GossipsubEvent::Unsubscribed { peer_id, topic } => {
                if let Some((peer, name)) = self.peer_names.get(&peer_id).cloned() {
                    if let Some(groups) = self.peer_groups.get_mut(&peer) {
                        groups.remove(&topic.to_string());
                    }
                    self.pending.push_back(InboxEvent::Leave {
                        peer,
                        name,
                        group: topic.into_string(),
                    });
                }
            }
            GossipsubEvent::GossipsubNotSupported { .. } => {}
        }
    }
}

impl NetworkBehaviourEventProcess<RequestResponseEvent<Packet, Packet>> for OcpBehaviour {
    fn inject_event(&mut self, event: RequestResponseEvent<Packet, Packet>) {
        match event {
            RequestResponseEvent::Message { peer, message } => match message {
                RequestResponseMessage::Request {
                    request, channel, ..
                } => match request {
                    Packet::Hello { name, headers } => {
                        self.register_peer(peer, name, headers);
                        self.hello
                            .send_response(
                                channel,
                                Packet::Hello {
                                    name: self.local_name.clone(),
                                    headers: self.local_headers.clone(),
                                },
                            )
                            .ok();
                    }
                    Packet::Whisper(payload) => {
                        if let Some((ocp_peer, name)) = self.peer_names.get(&peer).cloned() {
                            self.pending.push_back(InboxEvent::Whisper {
                                peer: ocp_peer,
                                name,
                                payload,
                            });
                        }
                        self.hello.send_response(channel, Packet::Ack).ok();
                    }
                    Packet::Ack => {
                        self.hello.send_response(channel, Packet::Ack).ok();
                    }
                },
                RequestResponseMessage::Response { response, .. } => {
                    if let Packet::Hello { name, headers } = response {
                        self.register_peer(peer, name, headers);
                    }
                }
            },
            RequestResponseEvent::OutboundFailure { error, .. } => {
                tracing::warn!("whisper delivery failed: {}", error);
            }
            RequestResponseEvent::InboundFailure { error, .. } => {
                tracing::warn!("inbound request failed: {}", error);
            }
            RequestResponseEvent::ResponseSent { .. } => {}
        }
    }
}

/// libp2p's own `PeerId` is a multihash over a public key; this protocol's
/// addressing model wants a flat 16-byte `PeerId`. There is no
/// cryptographic binding between the two here — authentication is out of
/// scope for this control plane — so truncating/padding the encoded libp2p
/// id is sufficient; see DESIGN.md for the tradeoff.
fn derive_peer_id(lp_peer: &libp2p::PeerId) -> PeerId {
    let encoded = lp_peer.to_bytes();
    let mut bytes = [0u8; 16];
    let n = encoded.len().min(16);
    bytes[..n].copy_from_slice(&encoded[..n]);
    PeerId::new(bytes)
}

/// Concrete [`Substrate`] over a libp2p swarm: TCP transport, noise
/// encryption, yamux multiplexing, mDNS for local peer discovery,
/// gossipsub for group SHOUT, and a small request-response protocol for
/// both the ENTER handshake and unicast WHISPER.
pub struct Libp2pSubstrate {
    swarm: Swarm<OcpBehaviour>,
    local_id: PeerId,
    name: String,
}

impl Libp2pSubstrate {
    /// Builds the swarm and starts listening on an ephemeral TCP port.
    /// `name`/headers are empty until [`Substrate::set_name`]/
    /// [`Substrate::set_header`] are called.
    pub async fn new(keypair: libp2p::identity::Keypair) -> anyhow::Result<Self> {
        let local_key = keypair.clone();
        let local_lp_id = libp2p::PeerId::from(local_key.public());
        let local_id = derive_peer_id(&local_lp_id);

        let transport = crate::transport::transport(local_key.clone())?;

        let gossipsub = Gossipsub::new(MessageAuthenticity::Signed(local_key.clone()), GossipsubConfig::default())
            .map_err(|err| anyhow::anyhow!("gossipsub config error: {}", err))?;

        let behaviour = OcpBehaviour {
            mdns: Mdns::new(MdnsConfig::default()).await?,
            identify: Identify::new(IdentifyConfig::new(
                "/ocp/1.0.0".to_string(),
                local_key.public(),
            )),
            gossipsub,
            hello: RequestResponse::new(
                OcpCodec::default(),
                vec![(OcpProtocol, ProtocolSupport::Full)],
                RequestResponseConfig::default(),
            ),
            pending: VecDeque::new(),
            peer_names: HashMap::new(),
            peer_headers: HashMap::new(),
            peer_groups: HashMap::new(),
            local_id,
            local_name: String::new(),
            local_headers: HashMap::new(),
        };

        let mut swarm = Swarm::new(transport, behaviour, local_lp_id);
        swarm.listen_on("/ip4/0.0.0.0/tcp/0".parse()?)?;

        Ok(Self {
            swarm,
            local_id,
            name: String::new(),
        })
    }
}

#[async_trait(?Send)]
impl Substrate for Libp2pSubstrate {
    fn start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        self.swarm.behaviour_mut().local_name = name.to_string();
    }

    fn get_name(&self) -> &str {
        &self.name
    }

    fn get_uuid(&self) -> PeerId {
        self.local_id
    }

    fn set_header(&mut self, key: &str, value: &str) {
        self.swarm
            .behaviour_mut()
            .local_headers
            .insert(key.to_string(), value.to_string());
    }

    fn get_peer_header_value(&self, peer: PeerId, key: &str) -> Option<String> {
        self.swarm.behaviour().peer_headers.get(&peer)?.get(key).cloned()
    }

    fn join(&mut self, group: &str) -> anyhow::Result<()> {
        self.swarm
            .behaviour_mut()
            .gossipsub
            .subscribe(&Topic::new(group))
            .map_err(|err| anyhow::anyhow!("gossipsub subscribe error: {:?}", err))?;
        Ok(())
    }

    fn get_own_groups(&self) -> Vec<String> {
        self.swarm
            .behaviour()
            .gossipsub
            .topics()
            .map(|t| t.to_string())
            .collect()
    }

    fn get_peer_groups(&self, peer: PeerId) -> Vec<String> {
        self.swarm
            .behaviour()
            .peer_groups
            .get(&peer)
            .map(|g| g.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn whisper(&mut self, peer: PeerId, bytes: Vec<u8>) -> anyhow::Result<()> {
        let behaviour = self.swarm.behaviour_mut();
        let lp_peer = behaviour
            .peer_names
            .iter()
            .find(|(_, (ocp_peer, _))| *ocp_peer == peer)
            .map(|(lp, _)| *lp)
            .ok_or_else(|| anyhow::anyhow!("unknown peer {}", peer))?;
        behaviour.hello.send_request(&lp_peer, Packet::Whisper(bytes));
        Ok(())
    }

    fn shout(&mut self, group: &str, bytes: Vec<u8>) -> anyhow::Result<()> {
        self.swarm
            .behaviour_mut()
            .gossipsub
            .publish(Topic::new(group), bytes)
            .map_err(|err| anyhow::anyhow!("gossipsub publish error: {:?}", err))?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<InboxEvent> {
        loop {
            if let Some(ev) = self.swarm.behaviour_mut().pending.pop_front() {
                return Some(ev);
            }
            let polled = async_std::future::timeout(
                std::time::Duration::from_millis(0),
                self.swarm.select_next_some(),
            )
            .await;
            if polled.is_err() {
                return None;
            }
        }
    }
}
