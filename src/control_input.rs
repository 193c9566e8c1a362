//! Operator input multiplexer: a 5-channel radio read through GPIO edge
//! interrupts, merged with JSON remote-control input (delivered as a push
//! data input through the telemetry layer). JSON always wins when both are
//! present.

use micromath::F32Ext;

use crate::consts::RADIO_AXIS_STEP;

/// Five boolean radio channel levels (switch positions, not continuous
/// stick travel) plus a dirty flag set by the edge ISR. A typed array
/// instead of the source firmware's `"1"`/`"0"` string-literal pointer
/// compares.
#[derive(Clone, Copy, Debug, Default, defmt::Format)]
pub struct RadioChannels {
    pub channels: [bool; 5],
    pub updated: bool,
}

impl RadioChannels {
    pub fn on_edge(&mut self, channel: usize, level: bool) {
        if channel < self.channels.len() {
            self.channels[channel] = level;
            self.updated = true;
        }
    }

    /// Integrates the currently-held channel levels into `control`: channel
    /// 0 is throttle, channels 1/2 drive `direction[0]` up/down, channels
    /// 3/4 drive `direction[1]` up/down. Releasing an axis' channels zeroes
    /// it rather than holding the last value. Yaw is recomputed from the
    /// resulting direction vector every call, matching the source firmware
    /// re-deriving it on every mapped tick rather than only on release.
    fn apply_slow_drift(&self, control: &mut QuadControl) {
        if self.channels[0] {
            control.throttle = (control.throttle + RADIO_AXIS_STEP).clamp(0.0, 1.0);
        } else {
            control.throttle = 0.0;
        }

        if self.channels[1] {
            control.direction[0] = (control.direction[0] + RADIO_AXIS_STEP).clamp(-1.0, 1.0);
        } else if self.channels[2] {
            control.direction[0] = (control.direction[0] - RADIO_AXIS_STEP).clamp(-1.0, 1.0);
        } else {
            control.direction[0] = 0.0;
        }

        if self.channels[3] {
            control.direction[1] = (control.direction[1] + RADIO_AXIS_STEP).clamp(-1.0, 1.0);
        } else if self.channels[4] {
            control.direction[1] = (control.direction[1] - RADIO_AXIS_STEP).clamp(-1.0, 1.0);
        } else {
            control.direction[1] = 0.0;
        }

        control.yaw = control.direction[1].atan2(control.direction[0]);
    }
}

/// Shared control state written by both the radio mapper and the JSON
/// setter; fields are updated independently ("single-word write") rather
/// than the struct being replaced wholesale, matching the source firmware's
/// per-field globals.
#[derive(Clone, Copy, Debug, defmt::Format)]
pub struct QuadControl {
    pub throttle: f32,
    /// Commanded direction in the horizontal plane, each axis in [-1, 1].
    /// `direction[0]` feeds the pitch set-point, `direction[1]` the roll
    /// set-point (each scaled by `PI/4` where they're consumed).
    pub direction: [f32; 2],
    pub yaw: f32,
    pub radio_enabled: bool,
    pub yaw_regulation_enabled: bool,
    pub altitude_stabilization_enabled: bool,
    pub beep: bool,
    pub shut_off_motors: bool,
}

impl Default for QuadControl {
    fn default() -> Self {
        Self {
            throttle: 0.0,
            direction: [0.0, 0.0],
            yaw: 0.0,
            radio_enabled: true,
            yaw_regulation_enabled: false,
            altitude_stabilization_enabled: false,
            beep: false,
            shut_off_motors: false,
        }
    }
}

/// Radio channel roles. The source firmware's radio channels carried switch
/// positions and slow-drift stick analogues, not proportional sticks — see
/// `RadioChannels::apply_slow_drift`.
pub struct Oim {
    pub radio: RadioChannels,
    /// Set whenever a JSON remote-control message updated `QuadControl` this
    /// tick; cleared at the start of the next `merge`. While set, the radio
    /// mapper is skipped outright, regardless of `radio_enabled`.
    json_active: bool,
}

impl Default for Oim {
    fn default() -> Self {
        Self::new()
    }
}

impl Oim {
    pub fn new() -> Self {
        Self {
            radio: RadioChannels::default(),
            json_active: false,
        }
    }

    /// Called by the JSON setter registered as a telemetry push input.
    pub fn note_json_update(&mut self) {
        self.json_active = true;
    }

    /// Applies the radio mapping to `control` if JSON didn't already win
    /// this tick, `control.radio_enabled` is set, and at least one radio
    /// edge has ever been observed, then clears the per-tick JSON flag.
    /// Unlike a one-shot edge consumer, once the radio link is live the
    /// mapping re-applies every tick against the currently held channel
    /// levels, matching the source firmware's never-cleared update flag.
    pub fn merge(&mut self, control: &mut QuadControl) {
        if !self.json_active && control.radio_enabled && self.radio.updated {
            self.radio.apply_slow_drift(control);
        }
        self.json_active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radio_updates_control_when_json_silent() {
        let mut oim = Oim::new();
        let mut control = QuadControl::default();
        oim.radio.on_edge(0, true);
        oim.merge(&mut control);
        assert!(control.throttle > 0.0);
    }

    #[test]
    fn json_wins_over_radio_when_both_present() {
        let mut oim = Oim::new();
        let mut control = QuadControl::default();
        oim.radio.on_edge(0, true);
        oim.note_json_update();
        oim.merge(&mut control);
        // Radio's throttle drift must not have been applied.
        assert_eq!(control.throttle, 0.0);
    }

    #[test]
    fn radio_skipped_when_disabled() {
        let mut oim = Oim::new();
        let mut control = QuadControl::default();
        control.radio_enabled = false;
        oim.radio.on_edge(0, true);
        oim.merge(&mut control);
        assert_eq!(control.throttle, 0.0);
    }

    #[test]
    fn throttle_drifts_up_while_held_and_clamps_at_one() {
        let mut oim = Oim::new();
        let mut control = QuadControl::default();
        oim.radio.on_edge(0, true);
        for _ in 0..3000 {
            oim.merge(&mut control);
        }
        assert_eq!(control.throttle, 1.0);
    }

    #[test]
    fn releasing_throttle_channel_zeroes_it_immediately() {
        let mut oim = Oim::new();
        let mut control = QuadControl::default();
        oim.radio.on_edge(0, true);
        oim.merge(&mut control);
        assert!(control.throttle > 0.0);
        oim.radio.on_edge(0, false);
        oim.merge(&mut control);
        assert_eq!(control.throttle, 0.0);
    }

    #[test]
    fn yaw_tracks_direction_via_atan2() {
        let mut oim = Oim::new();
        let mut control = QuadControl::default();
        oim.radio.on_edge(1, true); // direction[0] drifting up
        oim.radio.on_edge(3, true); // direction[1] drifting up
        for _ in 0..100 {
            oim.merge(&mut control);
        }
        let expected = control.direction[1].atan2(control.direction[0]);
        assert!((control.yaw - expected).abs() < 1e-6);
        assert!(control.yaw > 0.0);
    }

    #[test]
    fn decrement_branch_clamps_its_own_axis_not_throttle() {
        // Regression for the source firmware's apparent `SAT(Throttle, ...)`
        // copy-paste in the decrement branches; each axis must clamp
        // itself, and holding ch2/ch4 down must not touch throttle at all.
        let mut oim = Oim::new();
        let mut control = QuadControl::default();
        control.throttle = 0.5;
        oim.radio.on_edge(2, true);
        oim.radio.on_edge(4, true);
        for _ in 0..5000 {
            oim.merge(&mut control);
        }
        assert_eq!(control.direction[0], -1.0);
        assert_eq!(control.direction[1], -1.0);
        assert_eq!(control.throttle, 0.0);
    }
}
