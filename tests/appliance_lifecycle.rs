//! End-to-end appliance lifecycle scenarios against a full server.

use stratus::api::Specification;
use stratus::config::Config;
use stratus::server::StratusServer;
use stratus::test;

fn test_server() -> StratusServer {
    let states = test::STATE_LIST_WITH_PHASES
        .iter()
        .map(|name| name.to_string())
        .collect();
    StratusServer::build(&Config::new(test::mem_storage(), states)).unwrap()
}

#[test]
fn state_touches_move_appliances_between_states() {
    let server = test_server();

    for (name, state) in [
        ("teststarted", "Started"),
        ("teststopped", "Stopped"),
        ("teststart", "Starting"),
        ("testpreboost", "Preparing"),
        ("testboost", "Boosting"),
    ] {
        let id = server.create_appliance(name, None).unwrap();
        server.touch_state(id, state).unwrap();
        assert_eq!(server.current_state(id).unwrap(), state);
    }
}

#[test]
fn specifications_version_per_appliance() {
    let server = test_server();
    let id = server.create_appliance("testspecification", None).unwrap();

    server.add_specification(id, 2, 4).unwrap();
    assert_eq!(
        server.latest_specification(id).unwrap(),
        Specification { cores: 2, ram: 4 }
    );

    server.add_specification(id, 4, 8).unwrap();
    assert_eq!(
        server.latest_specification(id).unwrap(),
        Specification { cores: 4, ram: 8 }
    );
    assert_eq!(
        server.previous_specification(id, 1).unwrap(),
        Specification { cores: 2, ram: 4 }
    );
}

#[test]
fn names_resolve_to_created_ids() {
    let server = test_server();
    let id = server.create_appliance("getname", None).unwrap();
    assert_eq!(server.appliance_id_for_name("getname").unwrap(), Some(id));
}

#[test]
fn details_of_a_fresh_appliance() {
    let server = test_server();
    let id = server.create_appliance("returndetails", None).unwrap();

    let details = server.appliance_details(id).unwrap();
    assert_eq!(details.id, id);
    assert_eq!(details.state, "Not yet initialised");
    assert_eq!(details.uuid, "returndetails");
}

#[test]
fn full_start_stop_cycle_on_disk() {
    test::test_under_tmp(|storage_uri| {
        let states = test::STATE_LIST_WITH_PHASES
            .iter()
            .map(|name| name.to_string())
            .collect();
        let config = Config::new(storage_uri, states);

        let vm = {
            let server = StratusServer::build(&config).unwrap();
            let account = server
                .create_account("user", "jb", "Joe Bloggs", "joe")
                .unwrap();
            let vm = server.create_appliance("cycle", None).unwrap();

            server.grant_ownership(vm, account).unwrap();
            server.add_credit(account, 100).unwrap();

            let job = server.start_appliance(vm).unwrap();
            server.advance_job(vm, "start").unwrap();
            server.advance_job(vm, "started").unwrap();
            assert!(server.job_status(job).unwrap().complete);
            vm
        };

        // Everything survives a server rebuild on the same storage.
        let server = StratusServer::build(&config).unwrap();
        assert_eq!(server.current_state(vm).unwrap(), "started");

        let job = server.stop_appliance(vm).unwrap();
        let status = server.job_status(job).unwrap();
        assert_eq!(status.phase, "pre-stop");
        assert!(!status.complete);

        server.advance_job(vm, "stop").unwrap();
        server.advance_job(vm, "stopped").unwrap();
        assert!(server.job_status(job).unwrap().complete);
    });
}
