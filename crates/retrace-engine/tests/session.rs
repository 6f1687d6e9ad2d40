//! Session lifecycle: begin/end, resume by identity, fatal aborts and
//! damaged logs.

use retrace_core::{ActionIndex, Simulation};
use retrace_engine::{ReplayConfig, ReplayError, Replayer, SeekStatus, Target};
use retrace_log::LogReader;
use retrace_test_utils::{LogBuilder, MockSimulation, ScriptedInput};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn replayer(sim: MockSimulation) -> Replayer<MockSimulation, ScriptedInput> {
    init_tracing();
    Replayer::new(sim, ScriptedInput::new(), ReplayConfig::default()).unwrap()
}

fn first_prompted_action(builder: &LogBuilder) -> u64 {
    let log = LogReader::from_bytes(&builder.build()).unwrap();
    (2..=log.command_count())
        .find(|&a| {
            log.command(ActionIndex(a))
                .is_some_and(|c| !c.answers.is_empty())
        })
        .expect("script raises a prompt")
}

/// The live simulation must sit on a state a straight replay reaches.
fn assert_on_recorded_state(r: &Replayer<MockSimulation, ScriptedInput>, builder: &LogBuilder) {
    let done = r.simulation().commands_done();
    assert_eq!(
        r.simulation().state_hash(),
        builder.state_at(done + 1).state_hash()
    );
}

#[test]
fn invalid_input_during_replay_aborts_the_session() {
    let plain = LogBuilder::new("healer", 12).actions(150);
    let prompted = first_prompted_action(&plain);
    let builder = plain.drop_answers_at(prompted);

    let mut r = replayer(builder.initial_simulation());
    r.begin_replay(&builder.build()).unwrap();
    let err = r.goto(prompted + 5, false).unwrap_err();

    assert!(matches!(err, ReplayError::InvalidDuringReplay { ref call } if call == "query"));
    assert!(err.is_fatal());
    assert!(r.session().is_none());
    assert_eq!(r.state(), SeekStatus::Idle);
    // Silent exit: no refresh reached the live surface.
    assert_eq!(r.live().refreshes(), 0);
    assert!(r.simulation().commands_done() < prompted);
    assert_on_recorded_state(&r, &builder);

    // A fresh session over the same log works up to the bad command.
    r.begin_replay(&builder.build()).unwrap();
    assert_eq!(r.goto(prompted, false).unwrap(), SeekStatus::AtGoal);
}

#[test]
fn simulation_failure_aborts_the_session() {
    let builder = LogBuilder::new("healer", 12).actions(100);
    let mut r = replayer(builder.initial_simulation().with_fault_at(40));
    r.begin_replay(&builder.build()).unwrap();

    let err = r.goto(60, false).unwrap_err();
    assert!(matches!(err, ReplayError::Simulation { action, .. } if action == ActionIndex(40)));
    assert!(r.session().is_none());
    assert_on_recorded_state(&r, &builder);
}

#[test]
fn failed_restore_falls_back_to_an_earlier_checkpoint() {
    let builder = LogBuilder::new("healer", 31).actions(200);
    let mut sim = builder.initial_simulation();
    sim.fail_next_loads(1);
    let mut r = replayer(sim);
    r.begin_replay(&builder.build()).unwrap();
    r.goto(150, false).unwrap();

    let nearest = r
        .checkpoints()
        .nearest_behind(ActionIndex(120))
        .and_then(|id| r.checkpoints().get(id))
        .map(|cp| cp.action)
        .unwrap();
    let executed_before = r.simulation().executed().len();

    assert_eq!(r.goto(120, false).unwrap(), SeekStatus::AtGoal);
    assert_eq!(
        r.simulation().state_hash(),
        builder.state_at(120).state_hash()
    );
    assert_eq!(r.simulation().loads(), 1);
    let first = r.simulation().executed()[executed_before];
    assert!(first < nearest.0);
}

#[test]
fn unrestorable_initial_checkpoint_is_fatal() {
    let builder = LogBuilder::new("healer", 31).actions(60);
    let mut sim = builder.initial_simulation();
    sim.fail_next_loads(1);
    let mut r = replayer(sim);
    r.begin_replay(&builder.build()).unwrap();
    r.goto(30, false).unwrap();

    let err = r.goto(10, false).unwrap_err();
    assert!(matches!(err, ReplayError::CheckpointRestore { action, .. } if action == ActionIndex::FIRST));
    assert!(r.session().is_none());
    // The abort rolled back to the initial checkpoint once loads worked again.
    assert_eq!(r.simulation().commands_done(), 0);
}

#[test]
fn unreadable_log_is_rejected() {
    let builder = LogBuilder::new("healer", 4).actions(20);
    let mut r = replayer(builder.initial_simulation());

    let err = r.begin_replay(b"this is not an action log").unwrap_err();
    assert!(matches!(err, ReplayError::Log(_)));
    assert!(r.session().is_none());
    r.begin_replay(&builder.build()).unwrap();
}

#[test]
fn partial_trailing_record_is_ignored() {
    let builder = LogBuilder::new("healer", 4).actions(30);
    let mut bytes = builder.build();
    bytes.truncate(bytes.len() - 3);

    let mut r = replayer(builder.initial_simulation());
    assert_eq!(r.begin_replay(&bytes).unwrap(), ActionIndex(31));
    assert_eq!(r.goto(0, false).unwrap(), SeekStatus::AtGoal);
    assert_eq!(
        r.simulation().state_hash(),
        builder.state_at(31).state_hash()
    );
}

#[test]
fn same_identity_resumes_with_its_checkpoints() {
    let builder = LogBuilder::new("healer", 8).actions(500);
    let mut r = replayer(builder.initial_simulation());
    r.begin_replay(&builder.build()).unwrap();
    r.goto(450, false).unwrap();
    let kept = r.checkpoints().len();
    r.end_replay().unwrap();

    let before = r.stats();
    assert_eq!(r.begin_replay(&builder.build()).unwrap(), ActionIndex(501));
    assert_eq!(r.stats().fast_restores, before.fast_restores + 1);
    assert_eq!(r.checkpoints().len(), kept);
    assert_eq!(r.current_position().unwrap().action, ActionIndex::FIRST);
    assert_eq!(
        r.simulation().state_hash(),
        builder.state_at(1).state_hash()
    );

    assert_eq!(r.goto(420, false).unwrap(), SeekStatus::AtGoal);
    assert_eq!(r.stats().fast_restores, before.fast_restores + 2);
    assert_eq!(
        r.simulation().state_hash(),
        builder.state_at(420).state_hash()
    );
}

#[test]
fn new_identity_starts_a_fresh_chain() {
    let first = LogBuilder::new("healer", 8).actions(200);
    let mut r = replayer(first.initial_simulation());
    r.begin_replay(&first.build()).unwrap();
    r.goto(180, false).unwrap();
    r.goto(1, false).unwrap();
    r.end_replay().unwrap();

    let second = LogBuilder::new("priest", 8).actions(200);
    r.begin_replay(&second.build()).unwrap();
    assert_eq!(r.checkpoints().len(), 1);
    assert_eq!(r.checkpoints().session(), Some(&second.session_id()));
    r.goto(60, false).unwrap();
    assert_eq!(
        r.simulation().state_hash(),
        second.state_at(60).state_hash()
    );
}

#[test]
fn desync_flag_is_sticky_per_identity() {
    let builder = LogBuilder::new("healer", 23).actions(250);
    let mut r = replayer(builder.initial_simulation().with_quirk_at(200));
    r.begin_replay(&builder.build()).unwrap();
    r.goto(230, false).unwrap();
    assert!(r.is_desynced());
    r.goto(1, false).unwrap();
    r.end_replay().unwrap();

    r.begin_replay(&builder.build()).unwrap();
    assert!(r.is_desynced());
    assert!(r.tracker().bitmap().desynced().count() > 0);
    r.end_replay().unwrap();

    let other = LogBuilder::new("healer", 23).started_at(1_700_086_400).actions(250);
    r.begin_replay(&other.build()).unwrap();
    assert!(!r.is_desynced());
    assert_eq!(r.tracker().bitmap().desynced().count(), 0);
}

#[test]
fn ending_mid_seek_hands_the_surface_back() {
    let builder = LogBuilder::new("healer", 4).actions(40);
    let mut r = replayer(builder.initial_simulation());
    r.begin_replay(&builder.build()).unwrap();
    r.aim(Target::Action(ActionIndex(30))).unwrap();
    assert_eq!(r.poll().unwrap(), SeekStatus::Seeking);

    r.end_replay().unwrap();
    assert!(r.session().is_none());
    assert_eq!(r.state(), SeekStatus::Idle);
    assert_eq!(r.live().refreshes(), 1);
    assert!(r.simulation().derived_fresh());
}

#[test]
fn options_and_timestamps_follow_the_position() {
    let builder = LogBuilder::new("healer", 6)
        .actions(60)
        .header_option("color", "on")
        .option_at(10, "autopickup", "off")
        .timestamp_at(12, 1_700_000_500);
    let mut r = replayer(builder.initial_simulation());
    r.begin_replay(&builder.build()).unwrap();

    r.goto(20, false).unwrap();
    let session = r.session().unwrap();
    assert_eq!(session.options().get("color").map(String::as_str), Some("on"));
    assert_eq!(session.options().get("autopickup").map(String::as_str), Some("off"));
    assert_eq!(session.last_timestamp(), Some(1_700_000_500));
    assert_eq!(r.simulation().option("autopickup"), Some("off"));
    assert_eq!(
        r.simulation().state_hash(),
        builder.state_at(20).state_hash()
    );

    r.goto(5, false).unwrap();
    let session = r.session().unwrap();
    assert_eq!(session.options().get("autopickup"), None);
    assert_eq!(session.last_timestamp(), None);
    assert_eq!(r.simulation().option("autopickup"), None);
    assert_eq!(
        r.simulation().state_hash(),
        builder.state_at(5).state_hash()
    );
}

#[test]
fn checkpoints_skip_positions_inside_an_occupation() {
    let builder = LogBuilder::new("healer", 14).actions(200);
    let log = LogReader::from_bytes(&builder.build()).unwrap();
    let config = ReplayConfig {
        checkpoint_interval: 1,
        ..ReplayConfig::default()
    };
    init_tracing();
    let mut r = Replayer::new(builder.initial_simulation(), ScriptedInput::new(), config).unwrap();
    r.begin_replay(&builder.build()).unwrap();
    r.goto(200, false).unwrap();

    let mut digs = 0;
    for a in 2..=200 {
        let after_dig = log.command(ActionIndex(a - 1)).unwrap().command.name == "dig";
        digs += usize::from(after_dig);
        assert_eq!(
            r.checkpoints().at_action(ActionIndex(a)).is_some(),
            !after_dig,
            "checkpoint presence at action {a}"
        );
    }
    assert!(digs > 0);
}
