//! Peer registry and signal smoothing: one record per remote sender, updated from the
//! receive path and queried synchronously by application logic.

use crate::packet::Packet;

/// Depth of the per-peer moving-average window.
pub const SIGNAL_WINDOW: usize = 3;

/// Raw value reported for an empty history slot and for unknown peers.
pub const NO_SAMPLE: i32 = -1;

/// Last `SIGNAL_WINDOW` RSSI samples, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalHistory {
    slots: [Option<i32>; SIGNAL_WINDOW],
}

impl SignalHistory {
    pub const fn new() -> Self {
        Self {
            slots: [None; SIGNAL_WINDOW],
        }
    }

    /// Shift every sample one slot older (dropping the oldest) and store `signal` as newest.
    pub fn push(&mut self, signal: i32) {
        self.slots.copy_within(0..SIGNAL_WINDOW - 1, 1);
        self.slots[0] = Some(signal);
    }

    pub fn newest(&self) -> Option<i32> {
        self.slots[0]
    }

    /// Number of real samples held (0..=SIGNAL_WINDOW).
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots[0].is_none()
    }

    /// Mean of the real samples; `None` when there are none.
    pub fn average(&self) -> Option<f64> {
        let count = self.len();
        if count == 0 {
            return None;
        }
        let sum: i64 = self.slots.iter().flatten().map(|&s| s as i64).sum();
        Some(sum as f64 / count as f64)
    }

    /// Slots as raw integers, empty slots reported as `NO_SAMPLE`.
    pub fn raw(&self) -> [i32; SIGNAL_WINDOW] {
        self.slots.map(|s| s.unwrap_or(NO_SAMPLE))
    }
}

impl Default for SignalHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything known about one remote sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePeer {
    id: u32,
    pub last_number: i32,
    pub last_text: String,
    pub last_buffer: Vec<u8>,
    pub last_send_time: u32,
    last_signal: i32,
    history: SignalHistory,
    packets_received: u64,
}

impl RemotePeer {
    fn new(id: u32) -> Self {
        Self {
            id,
            last_number: 0,
            last_text: String::new(),
            last_buffer: Vec::new(),
            last_send_time: 0,
            last_signal: NO_SAMPLE,
            history: SignalHistory::new(),
            packets_received: 0,
        }
    }

    /// Overwrite the payload fields and record the signal sample. `last_signal` and the
    /// newest history slot are only ever written here, together.
    fn apply(&mut self, packet: &Packet) {
        self.last_number = packet.number;
        self.last_text.clone_from(&packet.text);
        self.last_buffer.clone_from(&packet.buffer);
        self.last_send_time = packet.send_time;
        self.history.push(packet.signal);
        self.last_signal = packet.signal;
        self.packets_received = self.packets_received.saturating_add(1);
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn last_signal(&self) -> i32 {
        self.last_signal
    }

    pub fn history(&self) -> &SignalHistory {
        &self.history
    }

    pub fn averaged_signal(&self) -> Option<f64> {
        self.history.average()
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }
}

/// What `PeerRegistry::on_packet_received` did with a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome {
    /// First packet from this sender; a record was appended.
    Created(u32),
    /// Existing record updated.
    Updated(u32),
    /// Sender did not identify itself (serial 0); no record touched.
    Ignored,
}

/// Insertion-ordered set of remote peers. Only the registry mutates its records.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: Vec<RemotePeer>,
    last_packet: Option<Packet>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one received packet. Serial 0 is reserved for "sender unknown" and is not
    /// registered; the packet is still kept as `last_packet`.
    pub fn on_packet_received(&mut self, packet: Packet) -> PacketOutcome {
        let outcome = if packet.is_unidentified() {
            log::debug!("dropping packet without sender serial (rssi {})", packet.signal);
            PacketOutcome::Ignored
        } else if let Some(peer) = self.peers.iter_mut().find(|p| p.id == packet.sender_id) {
            peer.apply(&packet);
            log::trace!("peer {} updated: rssi {}", peer.id, packet.signal);
            PacketOutcome::Updated(peer.id)
        } else {
            let mut peer = RemotePeer::new(packet.sender_id);
            peer.apply(&packet);
            log::debug!("new peer {} heard at rssi {}", peer.id, packet.signal);
            self.peers.push(peer);
            PacketOutcome::Created(packet.sender_id)
        };
        self.last_packet = Some(packet);
        outcome
    }

    pub fn peer(&self, id: u32) -> Option<&RemotePeer> {
        self.peers.iter().find(|p| p.id == id)
    }

    /// Most recent RSSI from `id`, or `None` if the peer has never been heard.
    pub fn signal_strength(&self, id: u32) -> Option<i32> {
        self.peer(id).map(RemotePeer::last_signal)
    }

    /// Like `signal_strength`, with unknown peers reported as `NO_SAMPLE`.
    pub fn signal_strength_or_sentinel(&self, id: u32) -> i32 {
        self.signal_strength(id).unwrap_or(NO_SAMPLE)
    }

    /// Mean of the up to `SIGNAL_WINDOW` most recent samples from `id`.
    pub fn averaged_signal_strength(&self, id: u32) -> Option<f64> {
        self.peer(id).and_then(RemotePeer::averaged_signal)
    }

    /// Like `averaged_signal_strength`, with unknown peers reported as `NO_SAMPLE`.
    pub fn averaged_signal_strength_or_sentinel(&self, id: u32) -> f64 {
        self.averaged_signal_strength(id).unwrap_or(NO_SAMPLE as f64)
    }

    /// Peer with the strongest averaged signal. Ties go to the peer heard first.
    pub fn nearest_peer(&self) -> Option<(u32, f64)> {
        let mut best: Option<(u32, f64)> = None;
        for peer in &self.peers {
            let Some(avg) = peer.averaged_signal() else {
                continue;
            };
            match best {
                Some((_, b)) if avg <= b => {}
                _ => best = Some((peer.id, avg)),
            }
        }
        best
    }

    /// Peers in first-seen order.
    pub fn peers(&self) -> impl Iterator<Item = &RemotePeer> {
        self.peers.iter()
    }

    pub fn peer_ids(&self) -> Vec<u32> {
        self.peers.iter().map(|p| p.id).collect()
    }

    /// Most recently applied packet from any sender.
    pub fn last_packet(&self) -> Option<&Packet> {
        self.last_packet.as_ref()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
        self.last_packet = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn feed(reg: &mut PeerRegistry, id: u32, signals: &[i32]) {
        for &s in signals {
            reg.on_packet_received(Packet::from_sender(id, s));
        }
    }

    #[test]
    fn instant_signal_is_latest_sample() {
        let mut reg = PeerRegistry::new();
        feed(&mut reg, 42, &[-60, -70]);
        assert_eq!(reg.signal_strength(42), Some(-70));
        assert_eq!(reg.averaged_signal_strength(42), Some(-65.0));
    }

    #[test]
    fn average_uses_three_most_recent() {
        let mut reg = PeerRegistry::new();
        feed(&mut reg, 42, &[-60, -70, -80, -90]);
        assert_eq!(reg.averaged_signal_strength(42), Some(-80.0));
        assert_eq!(reg.peer(42).unwrap().history().raw(), [-90, -80, -70]);
    }

    #[test]
    fn unknown_peer_reports_sentinel() {
        let reg = PeerRegistry::new();
        assert_eq!(reg.signal_strength(7), None);
        assert_eq!(reg.signal_strength_or_sentinel(7), -1);
        assert_eq!(reg.averaged_signal_strength_or_sentinel(7), -1.0);
    }

    #[test]
    fn first_sample_leaves_remaining_slots_empty() {
        let mut reg = PeerRegistry::new();
        let outcome = reg.on_packet_received(Packet::from_sender(3, -55));
        assert_eq!(outcome, PacketOutcome::Created(3));
        let peer = reg.peer(3).unwrap();
        assert_eq!(peer.history().raw(), [-55, NO_SAMPLE, NO_SAMPLE]);
        assert_eq!(peer.history().len(), 1);
        assert_eq!(peer.averaged_signal(), Some(-55.0));
    }

    #[test]
    fn partial_window_averages_only_real_samples() {
        let mut reg = PeerRegistry::new();
        feed(&mut reg, 9, &[-50, -61]);
        assert_eq!(reg.averaged_signal_strength(9), Some(-55.5));
        feed(&mut reg, 9, &[-72]);
        assert_eq!(reg.averaged_signal_strength(9), Some(-61.0));
    }

    #[test]
    fn last_signal_tracks_newest_slot() {
        let mut reg = PeerRegistry::new();
        for s in [-40, -45, -90, -33, -70] {
            reg.on_packet_received(Packet::from_sender(1, s));
            let peer = reg.peer(1).unwrap();
            assert_eq!(Some(peer.last_signal()), peer.history().newest());
        }
        assert_eq!(reg.peer(1).unwrap().packets_received(), 5);
    }

    #[test]
    fn payload_fields_overwritten() {
        let mut reg = PeerRegistry::new();
        reg.on_packet_received(
            Packet::from_sender(8, -60)
                .with_number(1)
                .with_text("a")
                .with_buffer(vec![1])
                .with_send_time(100),
        );
        reg.on_packet_received(Packet::from_sender(8, -61).with_number(2).with_send_time(200));
        let peer = reg.peer(8).unwrap();
        assert_eq!(peer.last_number, 2);
        assert_eq!(peer.last_text, "");
        assert!(peer.last_buffer.is_empty());
        assert_eq!(peer.last_send_time, 200);
    }

    #[test]
    fn one_record_per_sender_regardless_of_order() {
        let mut packets: Vec<Packet> = (1..=20u32)
            .flat_map(|id| (0..4).map(move |k| Packet::from_sender(id, -40 - k)))
            .collect();
        packets.shuffle(&mut StdRng::seed_from_u64(20));
        let mut reg = PeerRegistry::new();
        for p in packets {
            reg.on_packet_received(p);
        }
        assert_eq!(reg.len(), 20);
        let mut ids = reg.peer_ids();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 20);
    }

    /// Interleave per-sender packet streams at random while keeping each sender's own order.
    fn interleave(streams: &[Vec<Packet>], rng: &mut StdRng) -> Vec<Packet> {
        let mut order: Vec<usize> = streams
            .iter()
            .enumerate()
            .flat_map(|(i, s)| std::iter::repeat(i).take(s.len()))
            .collect();
        order.shuffle(rng);
        let mut next = vec![0usize; streams.len()];
        order
            .into_iter()
            .map(|i| {
                let p = streams[i][next[i]].clone();
                next[i] += 1;
                p
            })
            .collect()
    }

    #[test]
    fn final_state_independent_of_interleaving() {
        let streams: Vec<Vec<Packet>> = (1..=12u32)
            .map(|id| {
                (0..(id as i32 % 5 + 1))
                    .map(|k| {
                        Packet::from_sender(id, -40 - 7 * k - id as i32)
                            .with_number(k)
                            .with_text(format!("{id}-{k}"))
                            .with_buffer(vec![k as u8; k as usize])
                            .with_send_time(k as u32 * 100)
                    })
                    .collect()
            })
            .collect();

        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut reference = PeerRegistry::new();
        for p in interleave(&streams, &mut rng) {
            reference.on_packet_received(p);
        }
        assert_eq!(reference.len(), streams.len());

        for _ in 0..8 {
            let mut reg = PeerRegistry::new();
            for p in interleave(&streams, &mut rng) {
                reg.on_packet_received(p);
            }
            assert_eq!(reg.len(), reference.len());
            for id in 1..=12u32 {
                let a = reference.peer(id).unwrap();
                let b = reg.peer(id).unwrap();
                assert_eq!(reg.signal_strength(id), reference.signal_strength(id));
                assert_eq!(
                    reg.averaged_signal_strength(id),
                    reference.averaged_signal_strength(id)
                );
                assert_eq!(b.history().raw(), a.history().raw());
                assert_eq!(b.last_number, a.last_number);
                assert_eq!(b.last_text, a.last_text);
                assert_eq!(b.last_buffer, a.last_buffer);
                assert_eq!(b.last_send_time, a.last_send_time);
                assert_eq!(b.packets_received(), a.packets_received());
            }
        }
    }

    #[test]
    fn peers_iterate_in_first_seen_order() {
        let mut reg = PeerRegistry::new();
        feed(&mut reg, 30, &[-50]);
        feed(&mut reg, 10, &[-50]);
        feed(&mut reg, 30, &[-51]);
        feed(&mut reg, 20, &[-50]);
        assert_eq!(reg.peer_ids(), vec![30, 10, 20]);
    }

    #[test]
    fn unidentified_sender_not_registered() {
        let mut reg = PeerRegistry::new();
        let outcome = reg.on_packet_received(Packet::from_sender(0, -50).with_number(4));
        assert_eq!(outcome, PacketOutcome::Ignored);
        assert!(reg.is_empty());
        assert_eq!(reg.signal_strength(0), None);
        assert_eq!(reg.last_packet().map(|p| p.number), Some(4));
    }

    #[test]
    fn real_minus_one_sample_is_counted() {
        let mut reg = PeerRegistry::new();
        feed(&mut reg, 5, &[-1, -3]);
        assert_eq!(reg.averaged_signal_strength(5), Some(-2.0));
    }

    #[test]
    fn nearest_peer_prefers_strongest_average() {
        let mut reg = PeerRegistry::new();
        assert_eq!(reg.nearest_peer(), None);
        feed(&mut reg, 1, &[-80, -82]);
        feed(&mut reg, 2, &[-50, -90]);
        feed(&mut reg, 3, &[-60]);
        assert_eq!(reg.nearest_peer(), Some((3, -60.0)));
        feed(&mut reg, 4, &[-60]);
        assert_eq!(reg.nearest_peer(), Some((3, -60.0)));
    }

    #[test]
    fn clear_forgets_everything() {
        let mut reg = PeerRegistry::new();
        feed(&mut reg, 1, &[-50]);
        reg.clear();
        assert!(reg.is_empty());
        assert!(reg.last_packet().is_none());
    }
}
