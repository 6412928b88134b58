//! End-to-end room scenarios driven through the registry with manual timers

use std::time::Duration;

use arena_server::config::LobbyConfig;
use arena_server::game::room::MAX_HP;
use arena_server::game::geometry::ARENA_HALF_EXTENT;
use arena_server::lobby::{ManualScheduler, Outbound, RoomRegistry, TimerEvent};
use arena_server::ws::protocol::{ClientMsg, RoomSettings, RoomStatus, ServerMsg, Visibility};
use uuid::Uuid;

fn registry() -> (RoomRegistry, ManualScheduler) {
    let scheduler = ManualScheduler::new();
    let reg = RoomRegistry::with_seed(LobbyConfig::default(), Box::new(scheduler.clone()), 42);
    (reg, scheduler)
}

fn create(max_players: u32, round_time: u32) -> ClientMsg {
    ClientMsg::CreateRoom(RoomSettings {
        name: "Duel".into(),
        map: "castle".into(),
        max_players,
        visibility: Visibility::Public,
        round_time,
        nickname: "alice".into(),
        character: "Knight_Male".into(),
    })
}

fn join(room_id: &str) -> ClientMsg {
    ClientMsg::JoinRoom {
        room_id: room_id.to_string(),
        nickname: "bob".into(),
        character: "Elf".into(),
        code: None,
    }
}

fn sent_to(out: &[Outbound], conn: Uuid) -> Vec<&ServerMsg> {
    out.iter()
        .filter(|o| o.to.contains(&conn))
        .map(|o| &o.msg)
        .collect()
}

fn created_room_id(out: &[Outbound]) -> String {
    out.iter()
        .find_map(|o| match &o.msg {
            ServerMsg::RoomCreated { room } => Some(room.id.clone()),
            _ => None,
        })
        .expect("room_created")
}

#[test]
fn two_players_ready_up_and_start() {
    let (mut reg, scheduler) = registry();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    reg.handle(a, create(2, 120));
    let room_id = created_room_id(&reg.drain_outbox());

    reg.handle(b, join(&room_id));
    reg.handle(a, ClientMsg::ToggleReady);
    reg.handle(b, ClientMsg::ToggleReady);
    reg.drain_outbox();

    reg.handle(a, ClientMsg::StartGame);
    let out = reg.drain_outbox();

    for conn in [a, b] {
        let start = sent_to(&out, conn)
            .into_iter()
            .find_map(|m| match m {
                ServerMsg::StartGame {
                    players,
                    spawned_weapons,
                    round_time,
                    ..
                } => Some((players.len(), spawned_weapons.len(), *round_time)),
                _ => None,
            });
        assert_eq!(start, Some((2, 10, 120)));
    }

    assert_eq!(reg.room(&room_id).unwrap().status, RoomStatus::Playing);
    let periods: Vec<_> = scheduler
        .active_for(&room_id)
        .into_iter()
        .filter_map(|t| t.period)
        .collect();
    assert!(periods.contains(&Duration::from_millis(100)));
    assert!(periods.contains(&Duration::from_secs(1)));

    // A third player is turned away
    let c = Uuid::new_v4();
    reg.handle(c, join(&room_id));
    let out = reg.drain_outbox();
    assert!(sent_to(&out, c)
        .iter()
        .any(|m| matches!(m, ServerMsg::RoomError { code, .. } if code == "room_full")));
}

#[test]
fn start_without_everyone_ready_is_rejected() {
    let (mut reg, scheduler) = registry();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    reg.handle(a, create(4, 60));
    let room_id = created_room_id(&reg.drain_outbox());
    reg.handle(b, join(&room_id));
    reg.handle(a, ClientMsg::ToggleReady);
    reg.drain_outbox();

    reg.handle(a, ClientMsg::StartGame);
    let out = reg.drain_outbox();
    assert_eq!(
        sent_to(&out, a),
        vec![&ServerMsg::error("not_all_ready", "Not all players are ready")]
    );
    assert!(sent_to(&out, b).is_empty());
    assert_eq!(reg.room(&room_id).unwrap().status, RoomStatus::Waiting);
    assert!(scheduler.active().is_empty());
}

#[test]
fn bots_fight_and_respawn() {
    let (mut reg, scheduler) = registry();
    let host = Uuid::new_v4();

    reg.handle(host, create(4, 300));
    let room_id = created_room_id(&reg.drain_outbox());
    reg.handle(host, ClientMsg::AddBot);
    reg.handle(host, ClientMsg::AddBot);
    reg.handle(host, ClientMsg::ToggleReady);
    reg.handle(host, ClientMsg::StartGame);
    reg.drain_outbox();

    let bots = reg.room(&room_id).unwrap().bot_ids();
    assert_eq!(bots.len(), 2);

    // Stack the bots on top of each other far from the human
    {
        let room = reg.room_mut(&room_id).unwrap();
        for p in room.players.iter_mut() {
            p.position = if p.is_bot() {
                glam::Vec3::new(30.0, 0.0, 30.0)
            } else {
                glam::Vec3::new(-30.0, 0.0, -30.0)
            };
        }
    }

    // Seven swings at 15 kill a bot at 100 hp; run the controller long enough
    let mut killed = None;
    for _ in 0..200 {
        reg.on_timer(TimerEvent::BotTick {
            room_id: room_id.clone(),
        });
        let out = reg.drain_outbox();
        if out.iter().any(|o| matches!(o.msg, ServerMsg::KillFeed { .. })) {
            let room = reg.room(&room_id).unwrap();
            killed = bots.iter().copied().find(|id| !room.player(id).unwrap().is_alive());
            break;
        }
    }
    let victim = killed.expect("a bot died");

    let respawn = scheduler
        .active_for(&room_id)
        .into_iter()
        .find(|t| t.event == TimerEvent::BotRespawn { room_id: room_id.clone(), bot_id: victim })
        .expect("respawn armed");
    assert_eq!(respawn.delay, Duration::from_secs(3));

    reg.on_timer(respawn.event);
    let out = reg.drain_outbox();
    assert!(out.iter().any(|o| o.msg
        == ServerMsg::HpUpdate {
            player_id: victim,
            hp: MAX_HP,
            attacker_id: victim
        }));

    let bot = reg.room(&room_id).unwrap().player(&victim).unwrap();
    assert_eq!(bot.hp, MAX_HP);
    assert!(bot.position.x.abs() <= ARENA_HALF_EXTENT);
    assert!(bot.position.z.abs() <= ARENA_HALF_EXTENT);
}

#[test]
fn sole_occupant_leaving_cancels_everything() {
    let (mut reg, scheduler) = registry();
    let host = Uuid::new_v4();

    reg.handle(host, create(4, 60));
    let room_id = created_room_id(&reg.drain_outbox());
    reg.handle(host, ClientMsg::AddBot);
    reg.handle(host, ClientMsg::ToggleReady);
    reg.handle(host, ClientMsg::StartGame);
    assert!(!scheduler.active_for(&room_id).is_empty());

    reg.leave_room(host);
    reg.drain_outbox();
    assert_eq!(reg.room_count(), 0);
    assert!(scheduler.active().is_empty());

    // Events already in flight find no room
    for timer in scheduler.all() {
        reg.on_timer(timer.event);
    }
    assert!(reg.drain_outbox().is_empty());
}

#[test]
fn round_ends_and_can_be_restarted() {
    let (mut reg, scheduler) = registry();
    let host = Uuid::new_v4();

    reg.handle(host, create(2, 3));
    let room_id = created_room_id(&reg.drain_outbox());
    reg.handle(host, ClientMsg::ToggleReady);
    reg.handle(host, ClientMsg::StartGame);
    reg.drain_outbox();

    let mut remaining = Vec::new();
    for _ in 0..3 {
        reg.on_timer(TimerEvent::RoundTick {
            room_id: room_id.clone(),
        });
        for o in reg.drain_outbox() {
            match o.msg {
                ServerMsg::UpdateTimer { seconds_remaining } => remaining.push(seconds_remaining),
                ServerMsg::GameEnd { results } => assert_eq!(results.len(), 1),
                _ => {}
            }
        }
    }
    assert_eq!(remaining, vec![2, 1, 0]);
    assert_eq!(reg.room(&room_id).unwrap().status, RoomStatus::Ended);
    assert!(scheduler.active_for(&room_id).is_empty());

    // Late ticks do nothing
    reg.on_timer(TimerEvent::RoundTick {
        room_id: room_id.clone(),
    });
    assert!(reg.drain_outbox().is_empty());

    reg.handle(host, ClientMsg::StartGame);
    assert_eq!(reg.room(&room_id).unwrap().status, RoomStatus::Playing);
    assert_eq!(scheduler.active_for(&room_id).len(), 2);
}
