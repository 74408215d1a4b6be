//! Property-based tests for the run state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::*;
use crate::assistants::{
    MessageContent, MessageRole, RequiredAction, Run, RunStatus, SubmitToolOutputs,
    ThreadMessage, ToolCallRequest,
};
use proptest::prelude::*;
use std::time::Duration;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context(max_polls: Option<u32>) -> RunContext {
    RunContext::new("thread_1", "asst_1", Duration::from_millis(2000), max_polls)
}

fn observed(status: RunStatus, calls: Option<Vec<ToolCallRequest>>) -> Run {
    Run {
        id: "run_1".into(),
        status,
        required_action: calls.map(|tool_calls| RequiredAction::SubmitToolOutputs {
            submit_tool_outputs: SubmitToolOutputs { tool_calls },
        }),
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_pending_status() -> impl Strategy<Value = RunStatus> {
    prop_oneof![
        Just(RunStatus::Queued),
        Just(RunStatus::InProgress),
        Just(RunStatus::Cancelling),
        Just(RunStatus::Unknown),
    ]
}

fn arb_failure_status() -> impl Strategy<Value = RunStatus> {
    prop_oneof![
        Just(RunStatus::Cancelled),
        Just(RunStatus::Failed),
        Just(RunStatus::Incomplete),
        Just(RunStatus::Expired),
    ]
}

fn arb_tool_call() -> impl Strategy<Value = ToolCallRequest> {
    (
        "call_[a-z0-9]{8}",
        prop_oneof![
            Just("set_background_color".to_string()),
            Just("set_foreground_color".to_string()),
            "[a-z_]{3,16}",
        ],
        "[ -~]{0,30}",
    )
        .prop_map(|(id, name, arguments)| ToolCallRequest::new(id, name, arguments))
}

fn arb_active_phase() -> impl Strategy<Value = RunPhase> {
    prop_oneof![
        Just(RunPhase::Appending),
        Just(RunPhase::Starting),
        (0u32..100).prop_map(|polls| RunPhase::Polling {
            run_id: "run_1".into(),
            polls,
        }),
        (0u32..100, proptest::collection::vec("call_[a-z]{4}", 0..4)).prop_map(
            |(polls, pending_ids)| RunPhase::SubmittingOutputs {
                run_id: "run_1".into(),
                polls,
                pending_ids,
            }
        ),
        Just(RunPhase::Draining {
            run_id: "run_1".into()
        }),
    ]
}

fn arb_settled_phase() -> impl Strategy<Value = RunPhase> {
    prop_oneof![
        Just(RunPhase::Idle),
        Just(RunPhase::Completed),
        Just(RunPhase::Cancelled),
        (1u32..50).prop_map(|polls| RunPhase::Stalled {
            reason: StallReason::PollLimit { polls }
        }),
    ]
}

fn arb_thread_message() -> impl Strategy<Value = ThreadMessage> {
    (
        "msg_[a-z0-9]{6}",
        prop_oneof![Just(MessageRole::User), Just(MessageRole::Assistant)],
        prop_oneof![
            "[a-zA-Z ]{0,40}".prop_map(|text| vec![MessageContent::text(text)]),
            Just(vec![MessageContent::Unsupported]),
            Just(vec![]),
        ],
    )
        .prop_map(|(id, role, content)| ThreadMessage { id, role, content })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // A requires_action batch is dispatched whole, never split or reordered
    #[test]
    fn prop_requires_action_dispatches_exact_batch(
        calls in proptest::collection::vec(arb_tool_call(), 1..6),
        polls in 0u32..20,
    ) {
        let phase = RunPhase::Polling { run_id: "run_1".into(), polls };
        let run = observed(RunStatus::RequiresAction, Some(calls.clone()));

        let result = transition(&phase, &test_context(None), Event::RunObserved { run }).unwrap();

        let dispatched: Vec<_> = result
            .effects
            .iter()
            .filter_map(|e| match e {
                Effect::DispatchTools { calls, .. } => Some(calls.clone()),
                _ => None,
            })
            .collect();
        prop_assert_eq!(dispatched, vec![calls.clone()]);

        match result.new_phase {
            RunPhase::SubmittingOutputs { pending_ids, .. } => {
                let ids: Vec<_> = calls.iter().map(|c| c.id.clone()).collect();
                prop_assert_eq!(pending_ids, ids);
            }
            other => prop_assert!(false, "expected SubmittingOutputs, got {:?}", other),
        }
    }

    // Completion always drains, whatever the poll budget says
    #[test]
    fn prop_completed_always_drains(polls in 0u32..1000, max in proptest::option::of(1u32..10)) {
        let phase = RunPhase::Polling { run_id: "run_1".into(), polls };
        let run = observed(RunStatus::Completed, None);

        let result = transition(&phase, &test_context(max), Event::RunObserved { run }).unwrap();

        prop_assert!(
            matches!(result.new_phase, RunPhase::Draining { .. }),
            "expected Draining, got {:?}",
            result.new_phase
        );
        prop_assert_eq!(result.effects, vec![Effect::FetchMessages]);
    }

    // Pending observations never exceed the poll budget
    #[test]
    fn prop_poll_limit_honored(
        statuses in proptest::collection::vec(arb_pending_status(), 1..40),
        max in 1u32..20,
    ) {
        let ctx = test_context(Some(max));
        let mut phase = RunPhase::Polling { run_id: "run_1".into(), polls: 0 };
        let mut observations = 0u32;

        for status in statuses {
            if phase.is_terminal() {
                break;
            }
            let result = transition(&phase, &ctx, Event::RunObserved { run: observed(status, None) }).unwrap();
            observations += 1;
            phase = result.new_phase;
        }

        prop_assert!(observations <= max);
        if observations == max {
            prop_assert_eq!(phase, RunPhase::Stalled { reason: StallReason::PollLimit { polls: max } });
        } else {
            prop_assert!(phase.is_active());
        }
    }

    // Terminal failures stall immediately and report the status
    #[test]
    fn prop_terminal_failure_stalls(status in arb_failure_status(), polls in 0u32..50) {
        let phase = RunPhase::Polling { run_id: "run_1".into(), polls };
        let result = transition(&phase, &test_context(None), Event::RunObserved { run: observed(status, None) }).unwrap();

        prop_assert_eq!(result.new_phase, RunPhase::Stalled { reason: StallReason::Terminal { status } });
    }

    // At most one run in flight
    #[test]
    fn prop_send_rejected_while_active(phase in arb_active_phase(), text in "[a-z]{1,20}") {
        let result = transition(&phase, &test_context(None), Event::Send { text });
        prop_assert_eq!(result.unwrap_err(), TransitionError::RunInFlight);
    }

    // A settled phase accepts the next message
    #[test]
    fn prop_send_accepted_when_settled(phase in arb_settled_phase(), text in "[a-z]{1,20}") {
        let result = transition(&phase, &test_context(None), Event::Send { text: text.clone() }).unwrap();
        prop_assert_eq!(result.new_phase, RunPhase::Appending);
        let expected = Effect::AppendMessage { text };
        prop_assert!(result.effects.contains(&expected));
    }

    // Cancel from any active phase lands in Cancelled
    #[test]
    fn prop_cancel_always_cancels(phase in arb_active_phase()) {
        let result = transition(&phase, &test_context(None), Event::Cancel).unwrap();
        prop_assert_eq!(result.new_phase, RunPhase::Cancelled);
        prop_assert!(result.effects.iter().all(|e| !e.yields_event()));
    }

    // Cancel of a settled phase is a no-op
    #[test]
    fn prop_cancel_settled_is_noop(phase in arb_settled_phase()) {
        let result = transition(&phase, &test_context(None), Event::Cancel).unwrap();
        prop_assert_eq!(result.new_phase, phase);
        prop_assert!(result.effects.is_empty());
    }

    // Drain replaces history with exactly the remote list, same order and length
    #[test]
    fn prop_drain_preserves_listing(messages in proptest::collection::vec(arb_thread_message(), 0..12)) {
        let phase = RunPhase::Draining { run_id: "run_1".into() };
        let result = transition(&phase, &test_context(None), Event::MessagesFetched { messages: messages.clone() }).unwrap();

        let replaced = result.effects.iter().find_map(|e| match e {
            Effect::ReplaceHistory { messages } => Some(messages.clone()),
            _ => None,
        });
        let replaced = replaced.expect("drain must replace history");

        prop_assert_eq!(replaced.len(), messages.len());
        for (local, remote) in replaced.iter().zip(&messages) {
            prop_assert_eq!(local.owner, Owner::from(remote.role));
            let expected = remote.first_text().unwrap_or(UNSUPPORTED_CONTENT);
            prop_assert_eq!(local.text.as_str(), expected);
        }
    }

    // Every effect that yields an event is followed by exactly one accepted event
    #[test]
    fn prop_each_transition_yields_at_most_one_event(
        phase in arb_active_phase(),
        status in prop_oneof![arb_pending_status(), arb_failure_status(), Just(RunStatus::Completed)],
    ) {
        let event = match &phase {
            RunPhase::Appending => Event::MessageAppended,
            RunPhase::Starting => Event::RunCreated { run_id: "run_1".into() },
            RunPhase::Polling { .. } => Event::RunObserved { run: observed(status, None) },
            RunPhase::SubmittingOutputs { pending_ids, .. } => Event::ToolOutputsSubmitted {
                run_id: "run_1".into(),
                count: pending_ids.len(),
            },
            _ => Event::MessagesFetched { messages: vec![] },
        };

        let result = transition(&phase, &test_context(Some(50)), event).unwrap();
        let yielding = result.effects.iter().filter(|e| e.yields_event()).count();
        if result.new_phase.is_terminal() {
            prop_assert_eq!(yielding, 0);
        } else {
            prop_assert_eq!(yielding, 1);
        }
    }
}
