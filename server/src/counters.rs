//! Monotonic instrumentation of lobby traffic and protocol events.

use log::info;

/// Snapshot of everything the server counts. All fields only ever grow.
///
/// The struct is `Copy + PartialEq` so an observer can hold the last snapshot
/// it printed and stay quiet while nothing changes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GameServerCounters {
    // Game lifecycle
    pub num_games_hosted: u64,
    pub num_games_started: u64,
    pub num_games_cancelled: u64,
    pub num_games_dropped: u64,
    // Protocol progress
    pub num_dropped_hosted_pokes: u64,
    pub num_update_request_sent: u64,
    pub num_retry_sent: u64,
    pub num_new_host: u64,
    // Traffic
    pub num_packets_received: u64,
    pub num_bytes_received: u64,
    pub num_packets_sent: u64,
    pub num_bytes_sent: u64,
    pub num_send_errors: u64,
    // Receive validation failures
    pub num_min_size_errors: u64,
    pub num_size_field_errors: u64,
    pub num_type_field_errors: u64,
    pub num_checksum_field_errors: u64,
    // Allocation failures
    pub num_failed_game_info_allocs: u64,
}

impl GameServerCounters {
    /// Logs the counters if anything changed since `last`, then updates
    /// `last`. Called from the event loop's tick branch so output appears at
    /// most once per second.
    pub fn report(&self, last: &mut GameServerCounters) {
        if self == last {
            return;
        }
        *last = *self;

        info!(
            "Games: (Hosted: {}, Started: {}, Cancelled: {}, Dropped: {})",
            self.num_games_hosted,
            self.num_games_started,
            self.num_games_cancelled,
            self.num_games_dropped
        );
        info!(
            "Traffic: (PacketRecv: {}, ByteRecv: {}, PacketSent: {}, ByteSent: {}, SendErr: {})",
            self.num_packets_received,
            self.num_bytes_received,
            self.num_packets_sent,
            self.num_bytes_sent,
            self.num_send_errors
        );
        info!(
            "Protocol: (DropHostPoke: {}, UpdateRequestSent: {}, RetrySent: {}, NewHost: {}, FailedAlloc: {})",
            self.num_dropped_hosted_pokes,
            self.num_update_request_sent,
            self.num_retry_sent,
            self.num_new_host,
            self.num_failed_game_info_allocs
        );

        let receive_errors = self.num_min_size_errors
            + self.num_size_field_errors
            + self.num_type_field_errors
            + self.num_checksum_field_errors;
        if receive_errors > 0 {
            info!(
                "RecvErrors: (MinSize: {}, SizeField: {}, TypeField: {}, Checksum: {})",
                self.num_min_size_errors,
                self.num_size_field_errors,
                self.num_type_field_errors,
                self.num_checksum_field_errors
            );
        }
    }
}
