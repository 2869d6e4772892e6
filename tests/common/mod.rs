//! In-process stand-in for a HEOS device.
//!
//! Speaks the line protocol on a loopback port and keeps just enough state
//! (a queue, a browsable library, an account) for the client's engines to
//! run against it.

#![allow(dead_code)]

use heos_control::{decode_value, ClientConfig, HeosClient};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const PASSWORD: &str = "secret";

type Writer = Arc<tokio::sync::Mutex<OwnedWriteHalf>>;

/// A command line as received
#[derive(Debug, Clone)]
pub struct Request {
    pub command: String,
    pub params: Vec<(String, String)>,
}

impl Request {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn parse(line: &str) -> Option<Self> {
        let rest = line.trim().strip_prefix("heos://")?;
        let (command, query) = rest.split_once('?').unwrap_or((rest, ""));
        let params = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (k.to_string(), decode_value(v)),
                None => (pair.to_string(), String::new()),
            })
            .collect();
        Some(Self {
            command: command.to_string(),
            params,
        })
    }
}

#[derive(Default)]
pub struct DeviceState {
    /// Queue entries without qid; positions are assigned when listed
    pub queue: Vec<Value>,
    /// Items served by browse and search
    pub library: Vec<Value>,
    /// `count` reported by browse and search instead of the library size
    pub declared_total: Option<usize>,
    /// "command under process" notices sent before each response
    pub delay_notices: usize,
    pub delay_interval: Duration,
    /// Send every response twice
    pub duplicate_responses: bool,
    pub signed_in_as: Option<String>,
    /// Media ids `browse/add_to_queue` refuses with eid 14
    pub rejected_media: Vec<String>,
    /// Push a progress event ahead of every registration response
    pub event_before_registration: bool,
    /// Answer registrations with a failure
    pub fail_registration: bool,
    pub requests: Vec<Request>,
    event_writers: Vec<Writer>,
}

pub struct MockDevice {
    pub port: u16,
    pub state: Arc<Mutex<DeviceState>>,
    task: JoinHandle<()>,
}

impl MockDevice {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(DeviceState::default()));

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let (reader, writer) = socket.into_split();
                let writer = Arc::new(tokio::sync::Mutex::new(writer));
                tokio::spawn(serve(BufReader::new(reader), writer, accept_state.clone()));
            }
        });

        Self { port, state, task }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_port(self.port)
            .with_timeouts(Duration::from_millis(100), Duration::from_millis(500))
            .with_queue_settle_delay(Duration::ZERO)
    }

    pub async fn client(&self) -> HeosClient {
        self.client_with(self.config()).await
    }

    pub async fn client_with(&self, config: ClientConfig) -> HeosClient {
        let client = HeosClient::new("127.0.0.1", config);
        client.connect().await.unwrap();
        client
    }

    /// Fill the queue with tracks `t1..=tN`
    pub fn set_queue(&self, len: usize) {
        self.state.lock().queue = (1..=len).map(|i| track(&format!("t{}", i))).collect();
    }

    /// Fill the library with `len` songs
    pub fn set_library(&self, len: usize) {
        self.state.lock().library = (0..len)
            .map(|i| json!({"container": "no", "playable": "yes", "type": "song", "name": format!("Song {}", i), "mid": format!("s{}", i)}))
            .collect();
    }

    /// Songs currently queued, in order
    pub fn queue_songs(&self) -> Vec<String> {
        self.state
            .lock()
            .queue
            .iter()
            .map(|item| item["song"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().requests.clone()
    }

    pub fn count_requests(&self, command: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.command == command)
            .count()
    }

    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }

    /// Push an event to every connection registered for change events
    pub async fn push_event(&self, command: &str, message: &str) {
        let writers = self.state.lock().event_writers.clone();
        let frame = frame(json!({"heos": {"command": command, "message": message}}));
        for writer in writers {
            let _ = writer.lock().await.write_all(frame.as_bytes()).await;
        }
    }

    pub async fn wait_for_event_registration(&self) {
        for _ in 0..100 {
            if !self.state.lock().event_writers.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no connection registered for events");
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A queue entry the device can re-add: song `name` from source 1024
pub fn track(name: &str) -> Value {
    json!({
        "song": name, "album": "Album", "artist": "Artist", "image_url": "",
        "mid": name, "album_id": "a1", "sid": 1024, "cid": "albums/1"
    })
}

/// Players `player/get_players` reports
pub fn players() -> Vec<Value> {
    vec![
        json!({"name": "Living Room", "pid": 1, "model": "HEOS 7", "version": "1.430.160", "ip": "127.0.0.1", "network": "wired", "lineout": 0, "serial": "ADAG9170202780"}),
        json!({"name": "Kitchen", "pid": -1465850739, "gid": -1465850739, "model": "HEOS 1", "version": "1.430.160", "ip": "127.0.0.1", "network": "wifi", "lineout": 0}),
    ]
}

fn frame(value: Value) -> String {
    format!("{}\r\n", value)
}

async fn serve(mut reader: BufReader<tokio::net::tcp::OwnedReadHalf>, writer: Writer, state: Arc<Mutex<DeviceState>>) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let Some(request) = Request::parse(&line) else {
            continue;
        };

        let (notices, interval, duplicate, early_event) = {
            let mut state = state.lock();
            state.requests.push(request.clone());
            let early_event = state.event_before_registration
                && request.command == "system/register_for_change_events";
            (state.delay_notices, state.delay_interval, state.duplicate_responses, early_event)
        };

        if early_event {
            let event = frame(json!({"heos": {"command": "event/player_now_playing_progress", "message": "pid=1&cur_pos=1000&duration=5000"}}));
            if writer.lock().await.write_all(event.as_bytes()).await.is_err() {
                return;
            }
        }

        for _ in 0..notices {
            let notice = frame(json!({"heos": {"command": request.command, "result": "success", "message": "command under process"}}));
            if writer.lock().await.write_all(notice.as_bytes()).await.is_err() {
                return;
            }
            tokio::time::sleep(interval).await;
        }

        let response = frame(respond(&request, &state, &writer));
        let mut w = writer.lock().await;
        if w.write_all(response.as_bytes()).await.is_err() {
            break;
        }
        if duplicate && w.write_all(response.as_bytes()).await.is_err() {
            break;
        }
    }
}

fn success(request: &Request, message: String) -> Value {
    json!({"heos": {"command": request.command, "result": "success", "message": message}})
}

fn fail(request: &Request, eid: u32, text: &str) -> Value {
    json!({"heos": {"command": request.command, "result": "fail", "message": format!("eid={}&text={}", eid, text)}})
}

fn respond(request: &Request, state: &Mutex<DeviceState>, writer: &Writer) -> Value {
    let mut state = state.lock();
    match request.command.as_str() {
        "system/heart_beat" | "system/reboot" | "system/prettify_json_response" => {
            success(request, String::new())
        }
        "system/register_for_change_events" if state.fail_registration => {
            fail(request, 11, "System error")
        }
        "system/register_for_change_events" => {
            let enable = request.param("enable").unwrap_or("off");
            state.event_writers.retain(|w| !Arc::ptr_eq(w, writer));
            if enable == "on" {
                state.event_writers.push(writer.clone());
            }
            success(request, format!("enable={}", enable))
        }
        "system/check_account" => match &state.signed_in_as {
            Some(user) => success(request, format!("signed_in&un={}", user)),
            None => success(request, "signed_out".to_string()),
        },
        "system/sign_in" => {
            let user = request.param("un").unwrap_or_default().to_string();
            if request.param("pw") == Some(PASSWORD) {
                state.signed_in_as = Some(user.clone());
                success(request, format!("signed_in&un={}", user))
            } else {
                fail(request, 6, "Invalid Credentials")
            }
        }
        "system/sign_out" => {
            state.signed_in_as = None;
            success(request, "signed_out".to_string())
        }
        "player/get_players" => {
            let mut response = success(request, String::new());
            response["payload"] = json!(players());
            response
        }
        "player/get_player_info" => {
            let pid = request.param("pid").and_then(|p| p.parse::<i64>().ok());
            match players().into_iter().find(|p| p["pid"].as_i64() == pid) {
                Some(player) => {
                    let mut response = success(request, format!("pid={}", pid.unwrap_or_default()));
                    response["payload"] = player;
                    response
                }
                None => fail(request, 2, "ID Not Valid"),
            }
        }
        "player/get_queue" => {
            let (start, end) = match request.param("range").and_then(|r| r.split_once(',')) {
                Some((s, e)) => (s.parse().unwrap_or(0), e.parse::<usize>().unwrap_or(0) + 1),
                None => (0, 100),
            };
            let end = end.min(state.queue.len());
            let start = start.min(end);
            let items: Vec<Value> = state.queue[start..end]
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let mut item = item.clone();
                    item["qid"] = json!(start + i + 1);
                    item
                })
                .collect();
            let mut response = success(
                request,
                format!("pid={}&returned={}&count={}", request.param("pid").unwrap_or_default(), items.len(), state.queue.len()),
            );
            response["payload"] = Value::Array(items);
            response
        }
        "player/remove_from_queue" => {
            let mut qids: Vec<usize> = request
                .param("qid")
                .unwrap_or_default()
                .split(',')
                .filter_map(|q| q.parse().ok())
                .collect();
            if qids.iter().any(|&q| q == 0 || q > state.queue.len()) {
                return fail(request, 9, "Parameter out of range");
            }
            qids.sort_unstable();
            for qid in qids.into_iter().rev() {
                state.queue.remove(qid - 1);
            }
            success(request, String::new())
        }
        "player/clear_queue" => {
            state.queue.clear();
            success(request, String::new())
        }
        "player/play_queue" => success(request, String::new()),
        "browse/add_to_queue" => {
            if request.param("aid") != Some("3") {
                return fail(request, 15, "Option not supported");
            }
            let cid = request.param("cid").unwrap_or_default();
            let name = request.param("mid").unwrap_or(cid);
            if state.rejected_media.iter().any(|m| m == name) {
                return fail(request, 14, "Media can't be played");
            }
            let mut item = track(name);
            item["sid"] = json!(request.param("sid").and_then(|s| s.parse::<i64>().ok()));
            item["cid"] = json!(cid);
            state.queue.push(item);
            success(request, String::new())
        }
        "browse/get_music_sources" => {
            let mut response = success(request, String::new());
            response["payload"] = json!([
                {"name": "Local Music", "image_url": "", "type": "heos_server", "sid": 1024, "available": "true"},
                {"name": "TuneIn", "image_url": "", "type": "music_service", "sid": 3, "available": "true", "service_username": "listener"}
            ]);
            response
        }
        "browse/browse" | "browse/search" => {
            let total = state.declared_total.unwrap_or(state.library.len());
            let (start, end) = match request.param("range").and_then(|r| r.split_once(',')) {
                Some((s, e)) => (s.parse().unwrap_or(0), e.parse::<usize>().unwrap_or(0) + 1),
                None => (0, 50),
            };
            let end = end.min(state.library.len());
            let start = start.min(end);
            let items = state.library[start..end].to_vec();
            let mut response = success(
                request,
                format!("sid={}&returned={}&count={}", request.param("sid").unwrap_or_default(), items.len(), total),
            );
            response["payload"] = Value::Array(items);
            response
        }
        "browse/play_stream" => success(request, String::new()),
        _ => fail(request, 1, "Unrecognized Command"),
    }
}
