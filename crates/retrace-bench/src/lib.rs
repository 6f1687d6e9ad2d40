//! Benchmark profiles for the retrace replay engine.
//!
//! - [`reference_log`]: a 5 000-action mock session with checksums and
//!   change records on every action
//! - [`quirk_log`]: the same session replayed under a build that diverges
//!   at one action
//! - [`open_replayer`]: a replayer positioned at the start of a log

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use retrace_engine::{ReplayConfig, Replayer};
use retrace_test_utils::{LogBuilder, MockSimulation, ScriptedInput};

/// Actions in the reference session.
pub const REFERENCE_ACTIONS: u64 = 5_000;

/// Action at which [`quirk_log`] replays diverge.
pub const QUIRK_ACTION: u64 = 2_500;

/// The reference session recorder.
pub fn reference_log(seed: u64) -> LogBuilder {
    LogBuilder::new("bench", seed).actions(REFERENCE_ACTIONS)
}

/// The reference session plus a simulation that diverges at [`QUIRK_ACTION`].
pub fn quirk_log(seed: u64) -> (LogBuilder, MockSimulation) {
    let builder = reference_log(seed);
    let sim = builder.initial_simulation().with_quirk_at(QUIRK_ACTION);
    (builder, sim)
}

/// A replayer over `log` with a fresh session open at the first action.
pub fn open_replayer(
    sim: MockSimulation,
    log: &[u8],
    config: ReplayConfig,
) -> Replayer<MockSimulation, ScriptedInput> {
    let mut replayer =
        Replayer::new(sim, ScriptedInput::new(), config).expect("bench config is valid");
    replayer.begin_replay(log).expect("bench log is readable");
    replayer
}
