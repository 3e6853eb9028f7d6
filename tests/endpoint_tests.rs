//! NetworkEndpoint state machine and mirroring tests

#[cfg(test)]
mod tests {
    use defender_events::{
        bus::EventBus,
        endpoint::{ConnectionState, NetworkEndpoint, Role},
        event::{Event, EventKind, Listener, ListenerError},
        protocol::{AllowList, CopyEvent, CopyKind, ReceiverHandle, RemoteCall},
        receiver::EventReceiver,
        registry::ObjectRegistry,
        transport::{
            memory::{self, MemoryTransport},
            tcp::{TcpClientTransport, TcpServerTransport},
            Transport, TransportError, TransportEvent,
        },
        types::{
            ClientNumber, Direction, GridPosition, ObjectId, ObjectKind, ObjectSnapshot,
            ObjectState, ScreenPosition,
        },
    };
    use defender_events::transport::frame;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::rc::Rc;
    use std::time::Duration;

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Keeps every non-frame event it sees.
    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
    }

    impl Recorder {
        fn of_kind(&self, kind: EventKind) -> Vec<Event> {
            self.events.iter().filter(|e| e.kind() == kind).cloned().collect()
        }
    }

    impl Listener for Recorder {
        fn notify(&mut self, event: &Event, _bus: &EventBus) -> Result<(), ListenerError> {
            if !matches!(event, Event::Tick { .. } | Event::Render) {
                self.events.push(event.clone());
            }
            Ok(())
        }
    }

    fn scripted_peer_addr() -> SocketAddr {
        "10.0.0.7:4000".parse().expect("addr")
    }

    /// Transport whose traffic is scripted by the test.
    #[derive(Clone, Default)]
    struct Wire {
        sent: Rc<RefCell<Vec<RemoteCall>>>,
        inbox: Rc<RefCell<VecDeque<TransportEvent>>>,
    }

    impl Wire {
        fn inject(&self, event: TransportEvent) {
            self.inbox.borrow_mut().push_back(event);
        }

        fn sent(&self) -> Vec<RemoteCall> {
            self.sent.borrow().clone()
        }
    }

    struct ScriptedTransport {
        wire: Wire,
        refuse: bool,
        connected: bool,
    }

    impl ScriptedTransport {
        fn new(wire: &Wire) -> Self {
            Self {
                wire: wire.clone(),
                refuse: false,
                connected: false,
            }
        }

        fn refusing(wire: &Wire) -> Self {
            Self {
                refuse: true,
                ..Self::new(wire)
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn open(&mut self) -> Result<(), TransportError> {
            if self.refuse {
                self.wire
                    .inject(TransportEvent::ConnectFailed("connection refused".into()));
            } else {
                self.connected = true;
                self.wire
                    .inject(TransportEvent::Connected(Some(scripted_peer_addr())));
            }
            Ok(())
        }

        fn send(&mut self, call: &RemoteCall) -> Result<(), TransportError> {
            if !self.connected {
                return Err(TransportError::NotConnected);
            }
            self.wire.sent.borrow_mut().push(call.clone());
            Ok(())
        }

        fn poll(&mut self) -> Vec<TransportEvent> {
            self.wire.inbox.borrow_mut().drain(..).collect()
        }

        fn close(&mut self) {
            self.connected = false;
        }
    }

    struct Node<T: Transport> {
        bus: EventBus,
        endpoint: Rc<RefCell<NetworkEndpoint<T>>>,
        receiver: Rc<RefCell<EventReceiver>>,
        recorder: Rc<RefCell<Recorder>>,
    }

    impl<T: Transport + 'static> Node<T> {
        fn new(role: Role, transport: T, allow: AllowList) -> Self {
            let objects = Rc::new(ObjectRegistry::new());
            let receiver = Rc::new(RefCell::new(EventReceiver::new(
                format!("{}-receiver", role),
                objects.clone(),
            )));
            let endpoint = Rc::new(RefCell::new(
                NetworkEndpoint::new(role, transport, allow, objects)
                    .with_receiver(receiver.clone()),
            ));
            let recorder = Rc::new(RefCell::new(Recorder::default()));

            let bus = EventBus::new();
            bus.register(&receiver);
            bus.register(&endpoint);
            bus.register(&recorder);
            Self {
                bus,
                endpoint,
                receiver,
                recorder,
            }
        }

        fn tick(&self) {
            self.bus.post(Event::tick(0.025));
        }

        fn send(&self, event: Event) {
            self.bus.post(event);
            self.tick();
        }

        fn state(&self) -> ConnectionState {
            self.endpoint.borrow().state()
        }
    }

    fn text(s: &str) -> Event {
        Event::text_message(s, true)
    }

    fn game_state() -> Event {
        Event::CompleteGameState {
            game_state: vec![ObjectSnapshot {
                kind: ObjectKind::Projectile,
                id: ObjectId(3),
                position: ScreenPosition::new(1.0, 2.0),
                velocity: ScreenPosition::new(0.0, 0.0),
                state: ObjectState::Dying,
            }],
        }
    }

    /// Client connected over a scripted wire: two ticks.
    fn connected_client(allow: AllowList) -> (Node<ScriptedTransport>, Wire) {
        let wire = Wire::default();
        let node = Node::new(Role::Client, ScriptedTransport::new(&wire), allow);
        node.tick();
        node.tick();
        assert_eq!(node.state(), ConnectionState::Connected);
        (node, wire)
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    #[test]
    fn new_endpoint_is_preparing() {
        let wire = Wire::default();
        let node = Node::new(Role::Client, ScriptedTransport::new(&wire), AllowList::default());
        assert_eq!(node.state(), ConnectionState::Preparing);
        assert!(node.endpoint.borrow().peer().is_none());
    }

    #[test]
    fn successful_connect_announces_server_connected() {
        let wire = Wire::default();
        let node = Node::new(Role::Client, ScriptedTransport::new(&wire), AllowList::default());

        node.tick();
        assert_eq!(node.state(), ConnectionState::Connecting);
        node.tick();
        assert_eq!(node.state(), ConnectionState::Connected);

        let connected = node.recorder.borrow().of_kind(EventKind::ServerConnected);
        assert_eq!(connected.len(), 1);
        let Event::ServerConnected { peer } = &connected[0] else {
            panic!("expected ServerConnected");
        };
        assert!(peer.is_alive());
        assert_eq!(peer.client_number(), None);

        // The receiver queued its announce; it goes out on the next step.
        node.tick();
        assert_eq!(
            wire.sent(),
            vec![RemoteCall::Announce(ReceiverHandle("client-receiver".into()))]
        );
    }

    #[test]
    fn refused_connection_ends_disconnected_without_sending() {
        let wire = Wire::default();
        let node = Node::new(Role::Client, ScriptedTransport::refusing(&wire), AllowList::default());

        node.tick();
        assert_eq!(node.state(), ConnectionState::Connecting);
        node.tick();
        assert_eq!(node.state(), ConnectionState::Disconnected);

        node.send(text("anyone?"));
        assert!(wire.sent().is_empty());
        assert!(node.recorder.borrow().of_kind(EventKind::ServerConnected).is_empty());
    }

    #[test]
    fn quit_disconnects_and_kills_the_peer() {
        let (node, _wire) = connected_client(AllowList::default());
        let peer = node.endpoint.borrow().peer().cloned().expect("peer");

        node.send(Event::ProgramQuit);
        assert_eq!(node.state(), ConnectionState::Disconnected);
        assert!(!peer.is_alive());
        assert!(!peer.call_remote(RemoteCall::Announce(ReceiverHandle("late".into()))));
    }

    #[test]
    fn lost_connection_moves_to_disconnected() {
        let (node, wire) = connected_client(AllowList::default());

        wire.inject(TransportEvent::Closed("connection reset".into()));
        node.tick();
        assert_eq!(node.state(), ConnectionState::Disconnected);
        assert!(node.endpoint.borrow().peer().is_none());
    }

    #[test]
    fn server_goes_back_to_accepting_when_its_peer_is_lost() {
        let wire = Wire::default();
        let node = Node::new(Role::Server, ScriptedTransport::new(&wire), AllowList::default());
        node.tick();
        node.tick();
        let first = node.endpoint.borrow().peer().cloned().expect("peer");

        wire.inject(TransportEvent::Closed("connection reset".into()));
        node.tick();
        assert_eq!(node.state(), ConnectionState::Connecting);
        assert!(node.endpoint.borrow().peer().is_none());
        assert!(!first.is_alive());

        // The listener was not closed, so the next accept just arrives.
        wire.inject(TransportEvent::Connected(Some(scripted_peer_addr())));
        node.tick();
        assert_eq!(node.state(), ConnectionState::Connected);
        let second = node.endpoint.borrow().peer().cloned().expect("peer");
        assert_eq!(second.client_number(), Some(ClientNumber(2)));
        assert!(!second.same_peer(&first));
    }

    #[test]
    fn server_quit_still_ends_disconnected() {
        let wire = Wire::default();
        let node = Node::new(Role::Server, ScriptedTransport::new(&wire), AllowList::default());
        node.tick();
        node.tick();
        node.send(Event::ProgramQuit);
        assert_eq!(node.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn server_reports_each_new_client_with_its_address() {
        let wire = Wire::default();
        let node = Node::new(Role::Server, ScriptedTransport::new(&wire), AllowList::default());
        node.tick();
        node.tick();

        let peer = node.endpoint.borrow().peer().cloned().expect("peer");
        assert_eq!(peer.peer_addr(), Some(scripted_peer_addr()));
        assert_eq!(
            node.recorder.borrow().of_kind(EventKind::NewClientConnected),
            vec![Event::NewClientConnected {
                client_number: ClientNumber(1),
                client_ip: Some(scripted_peer_addr().ip()),
            }]
        );
        // It stays local.
        assert!(wire.sent().is_empty());
    }

    #[test]
    fn disconnected_endpoint_stays_down_until_rearmed() {
        let (node, _wire) = connected_client(AllowList::default());
        assert!(!node.endpoint.borrow_mut().rearm());

        node.send(Event::ProgramQuit);
        node.tick();
        node.tick();
        assert_eq!(node.state(), ConnectionState::Disconnected);

        assert!(node.endpoint.borrow_mut().rearm());
        assert_eq!(node.state(), ConnectionState::Preparing);
        node.tick();
        node.tick();
        assert_eq!(node.state(), ConnectionState::Connected);
        assert_eq!(node.recorder.borrow().of_kind(EventKind::ServerConnected).len(), 2);
    }

    // -----------------------------------------------------------------------
    // Outbound filtering
    // -----------------------------------------------------------------------

    #[test]
    fn only_allow_listed_kinds_reach_the_transport() {
        let nothing_down: [CopyKind; 0] = [];
        let allow = AllowList::new([CopyKind::TextMessage], nothing_down).expect("allow-list");
        let (node, wire) = connected_client(allow);
        node.tick(); // flush the announce
        wire.sent.borrow_mut().clear();

        node.bus.post(Event::UserKeyboardInput {
            input: Direction::Up,
            origin: None,
        });
        node.bus.post(Event::PlaceWallRequest {
            grid_position: GridPosition::new(1, 1),
            origin: None,
        });
        node.bus.post(Event::GameStartRequest { origin: None });
        node.bus.post(Event::Render);
        node.bus.post(text("allowed"));
        node.tick();

        assert_eq!(
            wire.sent(),
            vec![RemoteCall::SendEvent(CopyEvent::TextMessage {
                text: "allowed".into()
            })]
        );
    }

    #[test]
    fn text_message_can_opt_out_of_the_network() {
        let (node, wire) = connected_client(AllowList::default());
        node.tick();
        wire.sent.borrow_mut().clear();

        node.bus.post(Event::text_message("just for me", false));
        node.bus.post(text("for the server"));
        node.tick();

        assert_eq!(
            wire.sent(),
            vec![RemoteCall::SendEvent(CopyEvent::TextMessage {
                text: "for the server".into()
            })]
        );
        assert_eq!(node.recorder.borrow().of_kind(EventKind::TextMessage).len(), 2);
    }

    #[test]
    fn client_never_sends_server_to_client_kinds() {
        let (node, wire) = connected_client(AllowList::default());
        node.tick();
        wire.sent.borrow_mut().clear();

        node.send(game_state());
        assert!(wire.sent().is_empty());
    }

    #[test]
    fn events_before_connect_are_dropped_not_queued() {
        let wire = Wire::default();
        let node = Node::new(Role::Client, ScriptedTransport::new(&wire), AllowList::default());
        node.send(text("too early"));
        assert_eq!(node.state(), ConnectionState::Connecting);

        node.tick();
        node.tick();
        assert_eq!(node.state(), ConnectionState::Connected);
        assert!(!wire
            .sent()
            .iter()
            .any(|c| matches!(c, RemoteCall::SendEvent(_))));
    }

    #[test]
    fn server_waits_for_the_announce_before_delivering() {
        let wire = Wire::default();
        let node = Node::new(Role::Server, ScriptedTransport::new(&wire), AllowList::default());
        node.tick();
        node.tick();
        assert_eq!(node.state(), ConnectionState::Connected);

        let peer = node.endpoint.borrow().peer().cloned().expect("peer");
        assert_eq!(peer.client_number(), Some(ClientNumber(1)));

        node.send(game_state());
        assert!(wire.sent().is_empty());

        wire.inject(TransportEvent::Received(RemoteCall::Announce(ReceiverHandle(
            "client-receiver".into(),
        ))));
        node.tick();
        assert_eq!(peer.receiver(), Some(ReceiverHandle("client-receiver".into())));

        node.send(game_state());
        let sent = wire.sent();
        assert_eq!(sent.len(), 1);
        assert!(matches!(
            &sent[0],
            RemoteCall::DeliverEvent(CopyEvent::CompleteGameState { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Inbound filtering
    // -----------------------------------------------------------------------

    #[test]
    fn inbound_kinds_outside_the_allow_list_are_dropped() {
        let (node, wire) = connected_client(AllowList::default());

        // Text messages only travel client → server.
        wire.inject(TransportEvent::Received(RemoteCall::DeliverEvent(
            CopyEvent::TextMessage { text: "spoof".into() },
        )));
        // A client never receives SendEvent.
        wire.inject(TransportEvent::Received(RemoteCall::SendEvent(
            CopyEvent::GameStartRequest,
        )));
        node.tick();

        let recorder = node.recorder.borrow();
        assert!(recorder.of_kind(EventKind::TextMessage).is_empty());
        assert!(recorder.of_kind(EventKind::GameStartRequest).is_empty());
        assert_eq!(node.receiver.borrow().received(), 0);
    }

    #[test]
    fn server_stamps_inbound_events_with_the_client_number() {
        let wire = Wire::default();
        let node = Node::new(Role::Server, ScriptedTransport::new(&wire), AllowList::default());
        node.tick();
        node.tick();

        wire.inject(TransportEvent::Received(RemoteCall::SendEvent(
            CopyEvent::PlaceWallRequest {
                grid_position: GridPosition::new(4, 4),
            },
        )));
        node.tick();

        let walls = node.recorder.borrow().of_kind(EventKind::PlaceWallRequest);
        assert_eq!(
            walls,
            vec![Event::PlaceWallRequest {
                grid_position: GridPosition::new(4, 4),
                origin: Some(ClientNumber(1)),
            }]
        );
        assert_eq!(node.receiver.borrow().received(), 1);
    }

    // -----------------------------------------------------------------------
    // In-memory client + server
    // -----------------------------------------------------------------------

    fn memory_nodes() -> (Node<MemoryTransport>, Node<MemoryTransport>) {
        let (client_side, server_side) = memory::pair();
        let server = Node::new(Role::Server, server_side, AllowList::default());
        let client = Node::new(Role::Client, client_side, AllowList::default());

        server.tick(); // listen
        client.tick(); // connect
        client.tick(); // connected, announce queued
        server.tick(); // peer accepted
        client.tick(); // announce flushed
        server.tick(); // announce received
        (client, server)
    }

    #[test]
    fn memory_pair_connects_both_sides() {
        let (client, server) = memory_nodes();
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(server.state(), ConnectionState::Connected);

        let peer = server.endpoint.borrow().peer().cloned().expect("peer");
        assert_eq!(peer.receiver(), Some(ReceiverHandle("client-receiver".into())));
        assert_eq!(server.recorder.borrow().of_kind(EventKind::ClientConnected).len(), 1);
    }

    #[test]
    fn client_requests_reach_the_server_bus() {
        let (client, server) = memory_nodes();

        client.send(Event::CharacterMoveRequest {
            character_id: ObjectId(12),
            direction: Direction::LeftDown,
            origin: None,
        });
        server.tick();

        let moves = server.recorder.borrow().of_kind(EventKind::CharacterMoveRequest);
        assert_eq!(
            moves,
            vec![Event::CharacterMoveRequest {
                character_id: ObjectId(12),
                direction: Direction::LeftDown,
                origin: Some(ClientNumber(1)),
            }]
        );
    }

    #[test]
    fn server_state_reaches_the_client_bus() {
        let (client, server) = memory_nodes();

        server.send(game_state());
        client.tick();

        let states = client.recorder.borrow().of_kind(EventKind::CompleteGameState);
        assert_eq!(states, vec![game_state()]);
        // Nothing echoes back to the server.
        server.tick();
        assert_eq!(server.recorder.borrow().of_kind(EventKind::CompleteGameState).len(), 1);
    }

    #[test]
    fn state_request_goes_up_and_character_states_come_down() {
        let (client, server) = memory_nodes();

        client.send(Event::CompleteGameStateRequest { origin: None });
        server.tick();
        assert_eq!(
            server.recorder.borrow().of_kind(EventKind::CompleteGameStateRequest),
            vec![Event::CompleteGameStateRequest {
                origin: Some(ClientNumber(1))
            }]
        );

        let states = Event::CharacterStates {
            character_states: vec![ObjectSnapshot {
                kind: ObjectKind::Character,
                id: ObjectId(1),
                position: ScreenPosition::new(32.0, 48.0),
                velocity: ScreenPosition::new(60.0, 0.0),
                state: ObjectState::Alive,
            }],
        };
        server.send(states.clone());
        client.tick();
        assert_eq!(
            client.recorder.borrow().of_kind(EventKind::CharacterStates),
            vec![states]
        );
    }

    #[test]
    fn server_accepts_a_new_client_after_the_first_quits() {
        let (client, server) = memory_nodes();

        client.send(Event::ProgramQuit);
        assert_eq!(client.state(), ConnectionState::Disconnected);

        server.tick();
        assert_eq!(server.state(), ConnectionState::Connecting);
        assert!(server.endpoint.borrow().peer().is_none());

        assert!(client.endpoint.borrow_mut().rearm());
        client.tick(); // connect
        client.tick(); // connected, announce queued
        server.tick(); // peer accepted
        client.tick(); // announce flushed
        server.tick(); // announce received
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(server.state(), ConnectionState::Connected);

        let peer = server.endpoint.borrow().peer().cloned().expect("peer");
        assert_eq!(peer.client_number(), Some(ClientNumber(2)));
        assert!(peer.receiver().is_some());
        assert_eq!(server.recorder.borrow().of_kind(EventKind::ClientConnected).len(), 2);
        assert_eq!(
            server.recorder.borrow().of_kind(EventKind::NewClientConnected),
            vec![
                Event::NewClientConnected {
                    client_number: ClientNumber(1),
                    client_ip: None,
                },
                Event::NewClientConnected {
                    client_number: ClientNumber(2),
                    client_ip: None,
                },
            ]
        );

        client.send(Event::GameStartRequest { origin: None });
        server.tick();
        assert_eq!(
            server.recorder.borrow().of_kind(EventKind::GameStartRequest),
            vec![Event::GameStartRequest {
                origin: Some(ClientNumber(2))
            }]
        );
    }

    // -----------------------------------------------------------------------
    // TCP
    // -----------------------------------------------------------------------

    fn unused_port() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr")
    }

    /// Tick one node until `done` holds.
    fn tick_alone_until<T: Transport + 'static>(node: &Node<T>, done: impl Fn() -> bool) -> bool {
        for _ in 0..400 {
            node.tick();
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn tcp_client_without_a_server_gives_up() {
        let addr = unused_port();
        let node = Node::new(Role::Client, TcpClientTransport::new(addr), AllowList::default());

        // Opening never waits on the network; the outcome arrives on a
        // later tick.
        node.tick();
        assert_eq!(node.state(), ConnectionState::Connecting);
        let down = || node.state() == ConnectionState::Disconnected;
        assert!(tick_alone_until(&node, down), "refusal never reported");

        node.send(text("hello?"));
        assert!(node.endpoint.borrow().peer().is_none());
        assert!(node.recorder.borrow().of_kind(EventKind::ServerConnected).is_empty());
    }

    /// Tick both nodes until `done` holds, with a short pause between rounds.
    fn tick_until<A: Transport + 'static, B: Transport + 'static>(
        a: &Node<A>,
        b: &Node<B>,
        done: impl Fn() -> bool,
    ) -> bool {
        for _ in 0..400 {
            a.tick();
            b.tick();
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn tcp_client_and_server_exchange_events() {
        let server = Node::new(
            Role::Server,
            TcpServerTransport::new("127.0.0.1:0".parse().expect("addr")),
            AllowList::default(),
        );
        server.tick();
        assert_eq!(server.state(), ConnectionState::Connecting);
        let addr = server
            .endpoint
            .borrow()
            .transport()
            .local_addr()
            .expect("bound");

        let client = Node::new(Role::Client, TcpClientTransport::new(addr), AllowList::default());

        let announced = || {
            server
                .endpoint
                .borrow()
                .peer()
                .and_then(|p| p.receiver())
                .is_some()
        };
        assert!(tick_until(&client, &server, announced), "handshake timed out");
        assert_eq!(client.state(), ConnectionState::Connected);

        client.bus.post(text("over tcp"));
        let delivered = || !server.recorder.borrow().of_kind(EventKind::TextMessage).is_empty();
        assert!(tick_until(&client, &server, delivered), "message timed out");

        assert_eq!(
            server.recorder.borrow().of_kind(EventKind::TextMessage),
            vec![Event::TextMessage {
                text: "over tcp".into(),
                send_over_network: false,
                origin: Some(ClientNumber(1)),
            }]
        );
    }

    fn tcp_server() -> (Node<TcpServerTransport>, SocketAddr) {
        let server = Node::new(
            Role::Server,
            TcpServerTransport::new("127.0.0.1:0".parse().expect("addr")),
            AllowList::default(),
        );
        server.tick();
        let addr = server
            .endpoint
            .borrow()
            .transport()
            .local_addr()
            .expect("bound");
        (server, addr)
    }

    fn raw_frame(body: &str) -> Vec<u8> {
        let mut out = (body.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(body.as_bytes());
        out
    }

    #[test]
    fn tcp_server_skips_unknown_copies_and_keeps_the_link() {
        let (server, addr) = tcp_server();
        let mut raw = TcpStream::connect(addr).expect("connect");
        let accepted = || server.state() == ConnectionState::Connected;
        assert!(tick_alone_until(&server, accepted), "accept timed out");

        raw.write_all(&raw_frame(
            r#"{"call": "SendEvent", "args": {"name": "CopyNoSuchEvent", "speed": 3}}"#,
        ))
        .expect("write");
        let wall = RemoteCall::SendEvent(CopyEvent::PlaceWallRequest {
            grid_position: GridPosition::new(8, 2),
        });
        raw.write_all(&frame::encode(&wall).expect("encode"))
            .expect("write");

        let delivered = || {
            !server
                .recorder
                .borrow()
                .of_kind(EventKind::PlaceWallRequest)
                .is_empty()
        };
        assert!(tick_alone_until(&server, delivered), "known frame never arrived");
        assert_eq!(server.state(), ConnectionState::Connected);
        assert_eq!(server.receiver.borrow().received(), 1);
    }

    #[test]
    fn tcp_server_serves_a_second_client_after_the_first_quits() {
        let (server, addr) = tcp_server();

        let first = Node::new(Role::Client, TcpClientTransport::new(addr), AllowList::default());
        let announced = || {
            server
                .endpoint
                .borrow()
                .peer()
                .and_then(|p| p.receiver())
                .is_some()
        };
        assert!(tick_until(&first, &server, announced), "first handshake timed out");
        first.send(Event::ProgramQuit);

        let accepting = || server.state() == ConnectionState::Connecting;
        assert!(tick_alone_until(&server, accepting), "loss never noticed");

        let second = Node::new(Role::Client, TcpClientTransport::new(addr), AllowList::default());
        assert!(tick_until(&second, &server, announced), "second handshake timed out");

        second.bus.post(text("second"));
        let delivered = || !server.recorder.borrow().of_kind(EventKind::TextMessage).is_empty();
        assert!(tick_until(&second, &server, delivered), "message timed out");

        let texts = server.recorder.borrow().of_kind(EventKind::TextMessage);
        assert_eq!(texts[0].origin(), Some(ClientNumber(2)));
        let peer = server.endpoint.borrow().peer().cloned().expect("peer");
        assert_eq!(
            peer.peer_addr().map(|a| a.ip()),
            Some("127.0.0.1".parse().expect("ip"))
        );
    }
}
