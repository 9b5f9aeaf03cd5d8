//! Architecture Verification Suite
//!
//! Keeps the shared pieces usable from concurrent sessions and the plan
//! wire format stable.

#[cfg(test)]
mod architecture_tests {
    use analyst_agency::agent::{AgentKind, AgentRegistry, CachedProvider, LanguageModel, TimeoutProvider};
    use analyst_agency::orchestrator::{Plan, PlanInstruction, SessionStore, Supervisor, TurnResponse};
    use analyst_agency::tools::PythonRunner;

    // Everything a server would share across request tasks must be Send + Sync
    #[test]
    fn test_shared_components_are_thread_safe() {
        fn assert_send_sync<T: Send + Sync>() {}

        assert_send_sync::<Supervisor>();
        assert_send_sync::<SessionStore>();
        assert_send_sync::<LanguageModel>();
        assert_send_sync::<AgentRegistry>();
        assert_send_sync::<PythonRunner>();
        assert_send_sync::<CachedProvider>();
        assert_send_sync::<TimeoutProvider>();
    }

    #[test]
    fn test_turn_responses_can_cross_tasks() {
        fn assert_send<T: Send + 'static>() {}
        assert_send::<TurnResponse>();
        assert_send::<Plan>();
    }

    // Every catalog agent is addressable by its planner name
    #[test]
    fn test_catalog_names_round_trip() {
        for descriptor in AgentRegistry::catalog() {
            assert!(descriptor.kind.is_known());
            assert_eq!(AgentKind::from_name(&descriptor.kind.planner_name()), descriptor.kind);
        }
    }

    // Planner-facing instruction JSON uses `use`, not the Rust field name
    #[test]
    fn test_instruction_wire_format() {
        let instruction = PlanInstruction::new(["chart"], ["df"], "draw it");
        let value: serde_json::Value = serde_json::from_str(&instruction.to_agent_json()).unwrap();

        assert_eq!(value["use"], serde_json::json!(["df"]));
        assert_eq!(value["create"], serde_json::json!(["chart"]));
        assert!(value.get("uses").is_none());
        assert!(PlanInstruction::schema_json().contains("\"use\""));
    }
}
