use cib::{
    CallOptions, CibMessage, CibNode, CibNodeConfig, CibOptions, CibSource, CibStateSnapshot, CibStatus, CibTransport,
    Diff, Element, Generation, InMemoryNetwork, NodeExit, NodeId, Role,
};
use slog::Drain;
use std::error::Error;
use std::net::SocketAddr;
use std::path::Path;
use tempfile::TempDir;
use tokio::time::{Duration, Instant};

#[tokio::test]
async fn fresh_store_starts_empty_and_persists() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let logger = create_root_logger_for_stdout("fresh".to_string());
    let files = cib::CibFiles::new(dir.path(), "cib", 10);

    let recovered = cib::read_with_recovery(&logger, &files, true);
    assert_eq!(recovered.source, CibSource::Empty);
    assert_eq!(Generation::of(&recovered.document), Generation::new(0, 0, 0));

    cib::write_atomic(&logger, &files, &recovered.document)?;
    let on_disk = cib::validate(&logger, &files.primary())?;
    assert_eq!(Generation::of(&on_disk), Generation::new(0, 0, 0));

    Ok(())
}

#[tokio::test]
async fn master_modify_bumps_num_updates_and_forwards_diff() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let network = InMemoryNetwork::new();
    let _peer = network.add_listener(NodeId::new("b"));
    let node = cib::try_create_cib_node(in_memory_config("a", dir.path(), &network, true)).await?;
    let connection = node.connect("admin", true).await?;

    let create = CibMessage::request("create", CallOptions::SYNC_CALL)
        .with_section("nodes")
        .with_document(Element::new("node").with_attr("id", "n1"));
    connection.perform(create).await?;
    let before = node.state().generation;
    network.clear_sent();

    let modify = CibMessage::request("modify", CallOptions::SYNC_CALL)
        .with_section("nodes")
        .with_document(Element::new("node").with_attr("id", "n1").with_attr("uname", "alpha"));
    connection.perform(modify).await?;

    let after = node.state().generation;
    assert_eq!(after, Generation::new(before.admin_epoch, before.epoch, before.num_updates + 1));

    let forwarded: Vec<_> = network
        .sent_by(&NodeId::new("a"))
        .into_iter()
        .filter(|sent| sent.message.operation == "apply-diff")
        .collect();
    assert_eq!(forwarded.len(), 1);
    assert!(forwarded[0].to.is_none());
    let diff = forwarded[0].message.update_diff.as_ref().ok_or("diff missing")?;
    assert_eq!((diff.from, diff.to), (before, after));

    Ok(())
}

#[tokio::test]
async fn slave_requests_exactly_one_resync_for_a_stale_diff() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let network = InMemoryNetwork::new();
    let _master = network.add_listener(NodeId::new("a"));
    let node = cib::try_create_cib_node(in_memory_config("b", dir.path(), &network, false)).await?;

    network.inject(&NodeId::new("b"), global_replace("a", document_at(5)));
    wait_for_state(&node, |s| s.generation == Generation::new(0, 0, 5)).await?;
    network.clear_sent();

    let stale = Diff::compute(&document_at(3), &with_node(document_at(4), "n9"))?;
    network.inject(&NodeId::new("b"), global_diff("a", stale));
    let state = wait_for_state(&node, |s| s.resync_count == 1).await?;

    assert_eq!(state.generation, Generation::new(0, 0, 5));
    let resync_requests: Vec<_> = network
        .sent_by(&NodeId::new("b"))
        .into_iter()
        .filter(|sent| sent.message.operation == "sync-one")
        .collect();
    assert_eq!(resync_requests.len(), 1);
    assert_eq!(resync_requests[0].to, Some(NodeId::new("a")));

    Ok(())
}

#[tokio::test]
async fn global_replace_resets_resync_state() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let network = InMemoryNetwork::new();
    let _master = network.add_listener(NodeId::new("a"));
    let node = cib::try_create_cib_node(in_memory_config("b", dir.path(), &network, false)).await?;

    network.inject(&NodeId::new("b"), global_replace("a", document_at(5)));
    let stale = Diff::compute(&document_at(3), &document_at(4))?;
    network.inject(&NodeId::new("b"), global_diff("a", stale));
    wait_for_state(&node, |s| s.resync_count == 1).await?;

    network.inject(&NodeId::new("b"), global_replace("a", with_node(document_at(5), "n1")));
    let state = wait_for_state(&node, |s| s.resync_count == 0).await?;

    assert_eq!(state.generation, Generation::new(0, 0, 5));
    let connection = node.connect("reader", false).await?;
    let nodes = connection.query(Some("nodes")).await?.ok_or("no output")?;
    assert_eq!(nodes.children().len(), 1);

    Ok(())
}

#[tokio::test]
async fn stale_replace_is_rejected() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let network = InMemoryNetwork::new();
    let _master = network.add_listener(NodeId::new("a"));
    let node = cib::try_create_cib_node(in_memory_config("b", dir.path(), &network, false)).await?;

    network.inject(&NodeId::new("b"), global_replace("a", document_at(5)));
    network.inject(&NodeId::new("b"), global_replace("a", with_node(document_at(2), "old")));
    // Only applies on top of generation 5. Had the stale copy been installed it would fail.
    let next = Diff::compute(&document_at(5), &with_node(document_at(6), "n1"))?;
    network.inject(&NodeId::new("b"), global_diff("a", next));

    let state = wait_for_state(&node, |s| s.generation == Generation::new(0, 0, 6)).await?;
    assert_eq!(state.resync_count, 0);

    let connection = node.connect("reader", false).await?;
    let nodes = connection.query(Some("nodes")).await?.ok_or("no output")?;
    let ids: Vec<_> = nodes.children().iter().filter_map(|n| n.attr("id")).collect();
    assert_eq!(ids, vec!["n1"]);

    Ok(())
}

#[tokio::test]
async fn is_master_distinguishes_slaves() -> Result<(), Box<dyn Error>> {
    let network = InMemoryNetwork::new();
    let master_dir = TempDir::new()?;
    let slave_dir = TempDir::new()?;
    let master = cib::try_create_cib_node(in_memory_config("a", master_dir.path(), &network, true)).await?;
    let slave = cib::try_create_cib_node(in_memory_config("b", slave_dir.path(), &network, false)).await?;

    let on_master = master.connect("tool", true).await?;
    let on_slave = slave.connect("tool", true).await?;

    assert!(on_master.is_master().await?);
    assert!(!on_slave.is_master().await?);
    let err = on_slave
        .perform(CibMessage::request("is-master", CallOptions::SYNC_CALL))
        .await
        .err()
        .ok_or("slave claimed to be master")?;
    assert_eq!(err.status(), CibStatus::NotMaster);

    Ok(())
}

#[tokio::test]
async fn slave_follows_master_updates() -> Result<(), Box<dyn Error>> {
    let network = InMemoryNetwork::new();
    let master_dir = TempDir::new()?;
    let slave_dir = TempDir::new()?;
    let master = cib::try_create_cib_node(in_memory_config("a", master_dir.path(), &network, true)).await?;
    let slave = cib::try_create_cib_node(in_memory_config("b", slave_dir.path(), &network, false)).await?;

    let admin = master.connect("admin", true).await?;
    for id in ["n1", "n2"].iter() {
        let create = CibMessage::request("create", CallOptions::SYNC_CALL)
            .with_section("nodes")
            .with_document(Element::new("node").with_attr("id", *id));
        admin.perform(create).await?;
    }

    let expected = master.state().generation;
    let state = wait_for_state(&slave, |s| s.generation == expected).await?;
    assert_eq!(state.role, Role::Slave);

    let on_slave = slave.connect("reader", false).await?;
    let nodes = on_slave.query(Some("nodes")).await?.ok_or("no output")?;
    assert_eq!(nodes.children().len(), 2);

    Ok(())
}

#[tokio::test]
async fn standalone_node_reloads_its_document() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;

    let node = cib::try_create_cib_node(standalone_config(dir.path(), None)).await?;
    assert_eq!(node.state().role, Role::Master);
    let admin = node.connect("admin", true).await?;
    let create = CibMessage::request("create", CallOptions::SYNC_CALL)
        .with_section("resources")
        .with_document(Element::new("primitive").with_attr("id", "ip"));
    admin.perform(create).await?;
    wait_for_state(&node, |s| s.last_write.is_some()).await?;
    drop(admin);

    let exit = node.shutdown(Duration::from_secs(5)).await;
    assert!(matches!(exit, NodeExit::Terminated));

    let reloaded = cib::try_create_cib_node(standalone_config(dir.path(), None)).await?;
    let reader = reloaded.connect("reader", false).await?;
    let resources = reader.query(Some("resources")).await?.ok_or("no output")?;
    assert_eq!(resources.children()[0].attr("id"), Some("ip"));

    Ok(())
}

#[tokio::test]
async fn quit_stops_the_node() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let node = cib::try_create_cib_node(standalone_config(dir.path(), None)).await?;
    let admin = node.connect("admin", true).await?;

    admin.perform(CibMessage::request("quit", CallOptions::SYNC_CALL)).await?;

    assert!(matches!(node.wait_for_exit().await, NodeExit::Quit));
    Ok(())
}

#[tokio::test]
async fn remote_client_over_grpc() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let addr: SocketAddr = "127.0.0.1:47311".parse()?;
    let _node = cib::try_create_cib_node(standalone_config(dir.path(), Some(addr))).await?;

    let logger = create_root_logger_for_stdout("remote".to_string());
    let deadline = Instant::now() + Duration::from_secs(5);
    let remote = loop {
        match cib::connect_remote(logger.clone(), addr, "remote-tool", Duration::from_secs(5)).await {
            Ok(connection) => break connection,
            Err(e) if Instant::now() < deadline => {
                println!("Server not up yet: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(e) => return Err(e.into()),
        }
    };

    remote.perform(CibMessage::request("ping", CallOptions::SYNC_CALL)).await?;
    let status = remote.query(Some("status")).await?.ok_or("no output")?;
    assert_eq!(status.name(), "status");
    let create = CibMessage::request("create", CallOptions::SYNC_CALL)
        .with_section("nodes")
        .with_document(Element::new("node").with_attr("id", "n1"));
    let refused = remote.perform(create).await.err().ok_or("unprivileged create succeeded")?;
    assert_eq!(refused.status(), CibStatus::NotAuthorized);

    Ok(())
}

fn in_memory_config(node_id: &str, dir: &Path, network: &InMemoryNetwork, master: bool) -> CibNodeConfig {
    CibNodeConfig {
        node_id: node_id.to_string(),
        listen_addr: None,
        peers: Vec::new(),
        cib_directory: dir.to_path_buf(),
        info_logger: create_root_logger_for_stdout(node_id.to_string()),
        options: CibOptions {
            start_as_master: Some(master),
            resync_threshold: Some(3),
            ..CibOptions::default()
        },
        transport: CibTransport::InMemory(network.clone()),
    }
}

fn standalone_config(dir: &Path, listen_addr: Option<SocketAddr>) -> CibNodeConfig {
    CibNodeConfig {
        node_id: "solo".to_string(),
        listen_addr,
        peers: Vec::new(),
        cib_directory: dir.to_path_buf(),
        info_logger: create_root_logger_for_stdout("solo".to_string()),
        options: CibOptions::default(),
        transport: CibTransport::Grpc,
    }
}

fn document_at(num_updates: u32) -> Element {
    let mut doc = cib::empty_document();
    Generation::new(0, 0, num_updates).write_to(&mut doc);
    doc
}

fn with_node(mut doc: Element, id: &str) -> Element {
    let nodes = doc
        .child_mut("configuration")
        .and_then(|configuration| configuration.child_mut("nodes"))
        .expect("empty document has a nodes section");
    nodes.push_child(Element::new("node").with_attr("id", id));
    doc
}

fn global_replace(from: &str, doc: Element) -> CibMessage {
    let mut message = CibMessage::request("replace", CallOptions::NONE).with_document(doc);
    message.origin = Some(NodeId::new(from));
    message.global_update = true;
    message
}

fn global_diff(from: &str, diff: Diff) -> CibMessage {
    let mut message = CibMessage::request("apply-diff", CallOptions::NONE);
    message.update_diff = Some(diff);
    message.origin = Some(NodeId::new(from));
    message.global_update = true;
    message
}

async fn wait_for_state<F: Fn(&CibStateSnapshot) -> bool>(
    node: &CibNode,
    predicate: F,
) -> Result<CibStateSnapshot, Box<dyn Error>> {
    let mut listener = node.state_listener();
    let deadline = Instant::now() + Duration::from_secs(10);

    loop {
        let current = listener.current();
        if predicate(&current) {
            return Ok(current);
        }
        match tokio::time::timeout_at(deadline, listener.next()).await {
            Ok(Some(_)) => {}
            Ok(None) => return Err("node stopped publishing state".into()),
            Err(_) => return Err(format!("Timeout waiting for state, last seen {:?}", current).into()),
        }
    }
}

fn create_root_logger_for_stdout(node_id: String) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("NodeId" => node_id))
}
