/// One displayed "age" signal.
///
/// The displayed age only moves in two ways: it is reset from an observation timestamp the
/// first time that timestamp is seen, and it is advanced by forward-measured tick deltas in
/// between. It is never re-derived from absolute timestamps on a tick, so a wall clock that
/// steps backwards cannot shrink it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalAge {
    last_observed_ms: Option<i64>,
    displayed_age_ms: Option<i64>,
}

impl SignalAge {
    /// Returns `true` when the observation was new and reset the displayed age.
    pub fn observe(&mut self, observed_ms: i64, now_ms: i64) -> bool {
        if self.last_observed_ms == Some(observed_ms) {
            return false;
        }

        self.last_observed_ms = Some(observed_ms);
        self.displayed_age_ms = Some(now_ms.saturating_sub(observed_ms).max(0));
        true
    }

    pub fn advance(&mut self, delta_ms: i64) {
        if let Some(age) = self.displayed_age_ms.as_mut() {
            *age = age.saturating_add(delta_ms.max(0));
        }
    }

    pub fn invalidate(&mut self) {
        self.last_observed_ms = None;
        self.displayed_age_ms = None;
    }

    pub fn age_ms(&self) -> Option<i64> {
        self.displayed_age_ms
    }

    pub fn last_observed_ms(&self) -> Option<i64> {
        self.last_observed_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessReading {
    pub transport_age_ms: Option<i64>,
    pub status_age_ms: Option<i64>,
}

/// Ages of the transport heartbeat and of the validity-gated status payload.
#[derive(Debug, Clone)]
pub struct FreshnessTracker {
    transport: SignalAge,
    status: SignalAge,
    last_tick_ms: i64,
}

impl FreshnessTracker {
    pub fn new(now_ms: i64) -> Self {
        Self {
            transport: SignalAge::default(),
            status: SignalAge::default(),
            last_tick_ms: now_ms,
        }
    }

    pub fn record_transport(&mut self, received_ms: i64) {
        self.transport.observe(received_ms, received_ms);
    }

    /// `valid_timestamp_ms` is `None` when the payload reported itself invalid or carried no
    /// usable timestamp; the status age then becomes unknown until the next valid payload.
    pub fn record_status(&mut self, valid_timestamp_ms: Option<i64>, now_ms: i64) {
        match valid_timestamp_ms {
            Some(timestamp_ms) => {
                self.status.observe(timestamp_ms, now_ms);
            }
            None => self.status.invalidate(),
        }
    }

    pub fn tick(&mut self, now_ms: i64) -> FreshnessReading {
        let delta_ms = now_ms.saturating_sub(self.last_tick_ms).max(0);
        self.last_tick_ms = now_ms;

        self.transport.advance(delta_ms);
        self.status.advance(delta_ms);
        self.reading()
    }

    pub fn reading(&self) -> FreshnessReading {
        FreshnessReading {
            transport_age_ms: self.transport.age_ms(),
            status_age_ms: self.status.age_ms(),
        }
    }

    pub fn transport(&self) -> &SignalAge {
        &self.transport
    }

    pub fn status(&self) -> &SignalAge {
        &self.status
    }
}
