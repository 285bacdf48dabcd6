//! The peer table maintained by the discovery beacon.
//!
//! Peers are keyed by host name. The local host is always present, sits at
//! the layout origin, and is never evicted. Newly discovered peers are
//! placed to the right of the rightmost known rectangle with a 50-pixel gap;
//! the arrangement is otherwise caller-mediated (GUI or the `--edge` flag)
//! and read-only to the capture pipeline.

use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

use crate::domain::layout::{abuts, LayoutRect};
use crate::protocol::announce::AnnouncePacket;
use crate::protocol::events::ScreenEdge;

/// Horizontal gap inserted when auto-placing a newly discovered peer.
pub const PLACEMENT_GAP: i32 = 50;

/// Default staleness interval after which a silent peer is evicted.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(10);

/// A host known via discovery (or the local host itself).
#[derive(Debug, Clone)]
pub struct Peer {
    /// Display name; unique key within the table.
    pub name: String,
    pub addr: IpAddr,
    /// TCP service port the peer accepts sessions on.
    pub port: u16,
    pub screen_w: i32,
    pub screen_h: i32,
    /// Advertised role from the peer's announces.
    pub is_server: bool,
    /// Whether a live session is currently associated with this peer.
    pub connected: bool,
    pub last_seen: Instant,
    pub layout_x: i32,
    pub layout_y: i32,
}

impl Peer {
    /// The peer's rectangle in the shared layout space.
    pub fn rect(&self) -> LayoutRect {
        LayoutRect {
            x: self.layout_x,
            y: self.layout_y,
            w: self.screen_w,
            h: self.screen_h,
        }
    }
}

/// Outcome of feeding one announce into the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceOutcome {
    /// A new peer entry was created.
    Inserted,
    /// An existing entry was refreshed.
    Updated,
    /// The announce carried our own name and was ignored.
    Own,
}

/// The table of known peers, local host included.
#[derive(Debug)]
pub struct PeerTable {
    local_name: String,
    peers: Vec<Peer>,
}

impl PeerTable {
    /// Creates a table containing only the local host at the layout origin.
    pub fn new(local_name: impl Into<String>, screen_w: i32, screen_h: i32) -> Self {
        let local_name = local_name.into();
        let local = Peer {
            name: local_name.clone(),
            addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            screen_w,
            screen_h,
            is_server: false,
            connected: false,
            last_seen: Instant::now(),
            layout_x: 0,
            layout_y: 0,
        };
        Self {
            local_name,
            peers: vec![local],
        }
    }

    /// The local host's name.
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// The local host's entry.
    pub fn local(&self) -> &Peer {
        self.peers
            .iter()
            .find(|p| p.name == self.local_name)
            .unwrap_or(&self.peers[0])
    }

    /// The local screen's rectangle in layout space.
    pub fn local_rect(&self) -> LayoutRect {
        self.local().rect()
    }

    /// Records the role and service port the local endpoint advertises.
    pub fn set_local_service(&mut self, port: u16, is_server: bool) {
        let name = self.local_name.clone();
        if let Some(local) = self.get_mut_internal(&name) {
            local.port = port;
            local.is_server = is_server;
        }
    }

    /// All entries, local host included, in insertion order.
    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    /// Looks up a peer by name.
    pub fn get(&self, name: &str) -> Option<&Peer> {
        self.peers.iter().find(|p| p.name == name)
    }

    fn get_mut_internal(&mut self, name: &str) -> Option<&mut Peer> {
        self.peers.iter_mut().find(|p| p.name == name)
    }

    /// Feeds one received announce into the table.
    ///
    /// Announces carrying our own name are ignored. Known peers are refreshed
    /// in place; unknown peers are inserted and auto-placed to the right of
    /// the rightmost existing rectangle with a [`PLACEMENT_GAP`] gap.
    pub fn observe_announce(
        &mut self,
        pkt: &AnnouncePacket,
        source: IpAddr,
        now: Instant,
    ) -> AnnounceOutcome {
        if pkt.name == self.local_name {
            return AnnounceOutcome::Own;
        }

        if let Some(peer) = self.get_mut_internal(&pkt.name) {
            peer.addr = source;
            peer.port = pkt.port;
            peer.screen_w = pkt.screen_w;
            peer.screen_h = pkt.screen_h;
            peer.is_server = pkt.is_server;
            peer.last_seen = now;
            return AnnounceOutcome::Updated;
        }

        let layout_x = self
            .peers
            .iter()
            .map(|p| p.layout_x + p.screen_w)
            .max()
            .unwrap_or(0)
            + PLACEMENT_GAP;

        self.peers.push(Peer {
            name: pkt.name.clone(),
            addr: source,
            port: pkt.port,
            screen_w: pkt.screen_w,
            screen_h: pkt.screen_h,
            is_server: pkt.is_server,
            connected: false,
            last_seen: now,
            layout_x,
            layout_y: 0,
        });
        AnnounceOutcome::Inserted
    }

    /// Evicts peers not refreshed within `stale_after`. The local entry is
    /// never evicted. Returns the names removed.
    pub fn evict_stale(&mut self, now: Instant, stale_after: Duration) -> Vec<String> {
        let local_name = self.local_name.clone();
        let mut evicted = Vec::new();
        self.peers.retain(|p| {
            let keep = p.name == local_name || now.duration_since(p.last_seen) <= stale_after;
            if !keep {
                evicted.push(p.name.clone());
            }
            keep
        });
        evicted
    }

    /// Moves a peer's rectangle in layout space.
    pub fn set_layout_position(&mut self, name: &str, x: i32, y: i32) -> bool {
        match self.get_mut_internal(name) {
            Some(peer) => {
                peer.layout_x = x;
                peer.layout_y = y;
                true
            }
            None => false,
        }
    }

    /// Flags a peer as having (or no longer having) a live session.
    pub fn set_connected(&mut self, name: &str, connected: bool) -> bool {
        match self.get_mut_internal(name) {
            Some(peer) => {
                peer.connected = connected;
                true
            }
            None => false,
        }
    }

    /// Clears every connected flag; run as the last step of teardown.
    pub fn reset_connected(&mut self) {
        for peer in &mut self.peers {
            peer.connected = false;
        }
    }

    /// Associates an accepted session with the peer reachable at `addr` and
    /// seats its rectangle flush against the local screen on `edge`.
    ///
    /// When no discovered peer matches the address (the beacon may not have
    /// heard it yet), a placeholder entry named after the address is inserted
    /// with the local screen's dimensions so edge switching still resolves.
    /// Returns the peer's name.
    pub fn connect_peer_at(&mut self, addr: IpAddr, edge: ScreenEdge) -> String {
        let local_rect = self.local_rect();
        let local_name = self.local_name.clone();

        let name = match self
            .peers
            .iter()
            .find(|p| p.name != local_name && p.addr == addr)
        {
            Some(peer) => peer.name.clone(),
            None => {
                let name = addr.to_string();
                self.peers.push(Peer {
                    name: name.clone(),
                    addr,
                    port: 0,
                    screen_w: local_rect.w,
                    screen_h: local_rect.h,
                    is_server: false,
                    connected: false,
                    last_seen: Instant::now(),
                    layout_x: 0,
                    layout_y: 0,
                });
                name
            }
        };

        if let Some(peer) = self.get_mut_internal(&name) {
            peer.connected = true;
            match edge {
                ScreenEdge::Right => {
                    peer.layout_x = local_rect.right();
                    peer.layout_y = local_rect.y;
                }
                ScreenEdge::Left => {
                    peer.layout_x = local_rect.x - peer.screen_w;
                    peer.layout_y = local_rect.y;
                }
                ScreenEdge::Bottom => {
                    peer.layout_x = local_rect.x;
                    peer.layout_y = local_rect.bottom();
                }
                ScreenEdge::Top => {
                    peer.layout_x = local_rect.x;
                    peer.layout_y = local_rect.y - peer.screen_h;
                }
                ScreenEdge::None => {}
            }
        }
        name
    }

    /// Finds the connected peer whose rectangle abuts the local screen at
    /// `edge`, at perpendicular position `position`.
    pub fn neighbor_at(&self, edge: ScreenEdge, position: i32) -> Option<&Peer> {
        let local_rect = self.local_rect();
        self.peers.iter().find(|p| {
            p.name != self.local_name && p.connected && abuts(&local_rect, &p.rect(), edge, position)
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn announce(name: &str, w: i32, h: i32) -> AnnouncePacket {
        AnnouncePacket::announce(name, 24800, w, h, false)
    }

    fn addr(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
    }

    #[test]
    fn test_new_table_contains_only_local_at_origin() {
        let table = PeerTable::new("alpha", 1920, 1080);
        assert_eq!(table.peers().len(), 1);
        let local = table.local();
        assert_eq!(local.name, "alpha");
        assert_eq!((local.layout_x, local.layout_y), (0, 0));
    }

    #[test]
    fn test_observe_announce_inserts_then_updates() {
        let mut table = PeerTable::new("alpha", 1920, 1080);
        let now = Instant::now();

        let outcome = table.observe_announce(&announce("beta", 1280, 720), addr(2), now);
        assert_eq!(outcome, AnnounceOutcome::Inserted);

        let outcome = table.observe_announce(&announce("beta", 2560, 1440), addr(3), now);
        assert_eq!(outcome, AnnounceOutcome::Updated);

        let beta = table.get("beta").unwrap();
        assert_eq!(beta.addr, addr(3));
        assert_eq!((beta.screen_w, beta.screen_h), (2560, 1440));
        assert_eq!(table.peers().len(), 2);
    }

    #[test]
    fn test_observe_announce_ignores_own_name() {
        let mut table = PeerTable::new("alpha", 1920, 1080);
        let outcome = table.observe_announce(&announce("alpha", 1, 1), addr(2), Instant::now());
        assert_eq!(outcome, AnnounceOutcome::Own);
        assert_eq!(table.peers().len(), 1);
    }

    #[test]
    fn test_new_peer_is_placed_right_of_rightmost_with_gap() {
        let mut table = PeerTable::new("alpha", 1920, 1080);
        let now = Instant::now();

        table.observe_announce(&announce("beta", 1280, 720), addr(2), now);
        let beta = table.get("beta").unwrap();
        assert_eq!(beta.layout_x, 1920 + PLACEMENT_GAP);
        assert_eq!(beta.layout_y, 0);

        table.observe_announce(&announce("gamma", 800, 600), addr(3), now);
        let gamma = table.get("gamma").unwrap();
        assert_eq!(gamma.layout_x, 1920 + PLACEMENT_GAP + 1280 + PLACEMENT_GAP);
    }

    #[test]
    fn test_evict_stale_removes_silent_peer_but_never_local() {
        let mut table = PeerTable::new("alpha", 1920, 1080);
        let start = Instant::now();
        table.observe_announce(&announce("beta", 1280, 720), addr(2), start);

        let later = start + Duration::from_secs(11);
        let evicted = table.evict_stale(later, DEFAULT_STALE_AFTER);

        assert_eq!(evicted, vec!["beta".to_string()]);
        assert!(table.get("beta").is_none());
        assert!(table.get("alpha").is_some(), "local entry must survive eviction");
    }

    #[test]
    fn test_evict_stale_keeps_recently_seen_peers() {
        let mut table = PeerTable::new("alpha", 1920, 1080);
        let start = Instant::now();
        table.observe_announce(&announce("beta", 1280, 720), addr(2), start);

        let evicted = table.evict_stale(start + Duration::from_secs(9), DEFAULT_STALE_AFTER);
        assert!(evicted.is_empty());
        assert!(table.get("beta").is_some());
    }

    #[test]
    fn test_neighbor_at_requires_connected_flag() {
        let mut table = PeerTable::new("alpha", 1920, 1080);
        let now = Instant::now();
        table.observe_announce(&announce("beta", 1920, 1080), addr(2), now);
        table.set_layout_position("beta", 1920, 0);

        assert!(table.neighbor_at(ScreenEdge::Right, 540).is_none());

        table.set_connected("beta", true);
        let neighbor = table.neighbor_at(ScreenEdge::Right, 540).unwrap();
        assert_eq!(neighbor.name, "beta");
    }

    #[test]
    fn test_neighbor_at_respects_abutment_span() {
        let mut table = PeerTable::new("alpha", 1920, 1080);
        let now = Instant::now();
        table.observe_announce(&announce("beta", 1920, 540), addr(2), now);
        table.set_layout_position("beta", 1920, 0);
        table.set_connected("beta", true);

        assert!(table.neighbor_at(ScreenEdge::Right, 100).is_some());
        assert!(table.neighbor_at(ScreenEdge::Right, 900).is_none());
        assert!(table.neighbor_at(ScreenEdge::Left, 100).is_none());
    }

    #[test]
    fn test_connect_peer_at_marks_discovered_peer_and_seats_it() {
        let mut table = PeerTable::new("alpha", 1920, 1080);
        let now = Instant::now();
        table.observe_announce(&announce("beta", 1280, 720), addr(2), now);

        let name = table.connect_peer_at(addr(2), ScreenEdge::Right);
        assert_eq!(name, "beta");

        let beta = table.get("beta").unwrap();
        assert!(beta.connected);
        assert_eq!((beta.layout_x, beta.layout_y), (1920, 0));
        assert!(table.neighbor_at(ScreenEdge::Right, 540).is_some());
    }

    #[test]
    fn test_connect_peer_at_seats_left_edge_flush() {
        let mut table = PeerTable::new("alpha", 1920, 1080);
        let now = Instant::now();
        table.observe_announce(&announce("beta", 1280, 720), addr(2), now);

        table.connect_peer_at(addr(2), ScreenEdge::Left);
        let beta = table.get("beta").unwrap();
        assert_eq!(beta.layout_x, -1280);
        assert!(table.neighbor_at(ScreenEdge::Left, 300).is_some());
    }

    #[test]
    fn test_connect_peer_at_unknown_address_inserts_placeholder() {
        let mut table = PeerTable::new("alpha", 1920, 1080);
        let name = table.connect_peer_at(addr(9), ScreenEdge::Right);
        assert_eq!(name, "192.168.1.9");

        let peer = table.get(&name).unwrap();
        assert!(peer.connected);
        assert_eq!((peer.screen_w, peer.screen_h), (1920, 1080));
        assert!(table.neighbor_at(ScreenEdge::Right, 0).is_some());
    }

    #[test]
    fn test_reset_connected_clears_all_flags() {
        let mut table = PeerTable::new("alpha", 1920, 1080);
        let now = Instant::now();
        table.observe_announce(&announce("beta", 1920, 1080), addr(2), now);
        table.connect_peer_at(addr(2), ScreenEdge::Right);

        table.reset_connected();
        assert!(table.peers().iter().all(|p| !p.connected));
    }

    #[test]
    fn test_set_local_service_updates_local_entry() {
        let mut table = PeerTable::new("alpha", 1920, 1080);
        table.set_local_service(24800, true);
        assert_eq!(table.local().port, 24800);
        assert!(table.local().is_server);
    }
}
