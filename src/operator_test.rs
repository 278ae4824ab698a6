use super::*;
use crate::audio::tests::{MockOutput, ToneMicrophone};
use crate::config::AppConfig;
use crate::events::tests::MockEventEmitter;
use crate::plan::TriggerPlan;
use crate::relay::tests::MockRelay;
use crate::session::SessionServices;
use crate::speech::NoSpeechRecognizer;
use crate::trial::TrialPhase;
use crate::upload::tests::MockUploader;
use crate::upload::TrialStatus;
use std::sync::atomic::Ordering;
use std::time::Duration;

struct Console {
    session: Arc<TaskSession>,
    uploader: MockUploader,
    microphone: ToneMicrophone,
}

fn console(intervals: &[f64]) -> Console {
    let uploader = MockUploader::new();
    let microphone = ToneMicrophone::new(0.1);
    let services = SessionServices {
        relay: Arc::new(MockRelay::new()),
        uploader: Arc::new(uploader.clone()),
        microphone: Arc::new(microphone.clone()),
        output: Arc::new(MockOutput::default()),
        recognizer: Arc::new(NoSpeechRecognizer),
        emitter: Arc::new(MockEventEmitter::new()),
    };
    let plan = TriggerPlan::from_intervals(intervals).unwrap();
    Console {
        session: Arc::new(TaskSession::new("P01", &AppConfig::default(), plan, services)),
        uploader,
        microphone,
    }
}

#[test]
fn test_parse_actions() {
    assert_eq!("start".parse::<OperatorAction>(), Ok(OperatorAction::Start));
    assert_eq!(" S ".parse::<OperatorAction>(), Ok(OperatorAction::Start));
    assert_eq!("7".parse::<OperatorAction>(), Ok(OperatorAction::Tap(7)));
    assert_eq!("next".parse::<OperatorAction>(), Ok(OperatorAction::Next));
    assert_eq!("?".parse::<OperatorAction>(), Ok(OperatorAction::Status));
    assert_eq!("quit".parse::<OperatorAction>(), Ok(OperatorAction::Menu));
    assert_eq!("Finish".parse::<OperatorAction>(), Ok(OperatorAction::Finish));
    assert_eq!("".parse::<OperatorAction>(), Err(ActionParseError::Empty));
    assert_eq!(
        "-3".parse::<OperatorAction>(),
        Err(ActionParseError::Unknown("-3".to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_full_trial_then_next_then_menu() {
    let c = console(&[600.0]);
    let script = "start\n1\n2\n3\n4\n5\n6\n7\n8\n9\n10\nnext\nstatus\nmenu\nstart\n";
    run_operator(c.session.clone(), script.as_bytes(), CancellationToken::new()).await;

    let logs = c.uploader.task_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].0.status, TrialStatus::Completed);
    assert_eq!(logs[0].0.progress, 10);
    // `next` waited for the queued taps
    assert_eq!(c.session.history().len(), 1);
    assert_eq!(c.session.trial_state().trial_index, 1);
    // Nothing after `menu` is read
    assert_eq!(c.session.trial_state().phase, TrialPhase::NotStarted);
    assert!(c.session.is_closed());
    assert_eq!(c.microphone.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_end_of_input_abandons_running_trial() {
    let c = console(&[600.0]);
    run_operator(
        c.session.clone(),
        "start\nbogus\n\n1\n2\n".as_bytes(),
        CancellationToken::new(),
    )
    .await;

    let logs = c.uploader.task_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].0.status, TrialStatus::Aborted);
    assert_eq!(logs[0].0.progress, 2);
    assert!(c.session.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_locked_finish_keeps_reading() {
    let c = console(&[600.0]);
    run_operator(
        c.session.clone(),
        "finish\nstart\n1\n".as_bytes(),
        CancellationToken::new(),
    )
    .await;

    // `finish` was refused, so `start` and the tap still ran
    let logs = c.uploader.task_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].0.progress, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_console_and_closes_session() {
    let c = console(&[600.0]);
    let (_writer, reader) = tokio::io::duplex(64);
    let cancel = CancellationToken::new();
    let console_task = tokio::spawn(run_operator(
        c.session.clone(),
        tokio::io::BufReader::new(reader),
        cancel.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!c.session.is_closed());
    cancel.cancel();
    console_task.await.unwrap();
    assert!(c.session.is_closed());
}
