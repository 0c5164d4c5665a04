//! Upstream telemetry simulator
//!
//! Serves /firefighters, /beacons and /alerts with randomly varying
//! payload shapes: bare lists vs. wrapped objects, GPS as an ordered
//! pair vs. a mapping, nested vs. flat field aliases, plus the
//! occasional malformed element. Lets the engine's tolerant normalizer
//! be exercised end to end without real hardware.
//!
//! Usage:
//!   cargo run --bin firewatch-sim -- --port 8081

use bytes::Bytes;
use clap::Parser;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Upstream telemetry simulator for firewatch
#[derive(Parser, Debug)]
#[command(name = "firewatch-sim", version, about)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8081)]
    port: u16,

    /// Number of simulated firefighters
    #[arg(long, default_value_t = 4)]
    firefighters: usize,

    /// Number of simulated beacons
    #[arg(long, default_value_t = 3)]
    beacons: usize,

    /// RNG seed for reproducible runs
    #[arg(long, default_value_t = 0x5eed)]
    seed: u64,
}

/// Tiny xorshift64 generator; the feed needs variety, not quality.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }

    fn unit(&mut self) -> f64 {
        (self.next() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn chance(&mut self, percent: u64) -> bool {
        self.below(100) < percent
    }
}

struct SimFirefighter {
    tag: String,
    name: String,
    team: String,
    lat: f64,
    lon: f64,
    floor: i32,
    heart_rate: f64,
    scba_pressure: f64,
    battery: f64,
    // while > 0 the firefighter stops moving, eventually tripping man_down
    frozen_ticks: u32,
}

struct SimBeacon {
    beacon_id: String,
    name: String,
    lat: f64,
    lon: f64,
    floor: i32,
    battery: f64,
}

struct SimState {
    rng: XorShift64,
    firefighters: Vec<SimFirefighter>,
    beacons: Vec<SimBeacon>,
}

const BASE_LAT: f64 = 52.2297;
const BASE_LON: f64 = 21.0122;

const NAMES: &[&str] = &[
    "Jan Kowalski",
    "Anna Nowak",
    "Piotr Wisniewski",
    "Maria Wojcik",
    "Tomasz Kaminski",
    "Ewa Lewandowska",
];
const TEAMS: &[&str] = &["Alpha", "Bravo", "Charlie"];

impl SimState {
    fn new(seed: u64, firefighter_count: usize, beacon_count: usize) -> Self {
        let mut rng = XorShift64::new(seed);
        let firefighters = (0..firefighter_count)
            .map(|i| SimFirefighter {
                tag: format!("TAG-{:03}", i + 1),
                name: NAMES[i % NAMES.len()].to_string(),
                team: TEAMS[i % TEAMS.len()].to_string(),
                lat: BASE_LAT + rng.unit() * 0.0004,
                lon: BASE_LON + rng.unit() * 0.0004,
                floor: (i % 3) as i32,
                heart_rate: 80.0,
                scba_pressure: 300.0,
                battery: 100.0,
                frozen_ticks: 0,
            })
            .collect();
        let beacons = (0..beacon_count)
            .map(|i| SimBeacon {
                beacon_id: format!("BCN-{:02}", i + 1),
                name: format!("Stairwell {}", (b'A' + i as u8) as char),
                lat: BASE_LAT + i as f64 * 0.0002,
                lon: BASE_LON + i as f64 * 0.0002,
                floor: (i % 3) as i32,
                battery: 100.0,
            })
            .collect();
        Self { rng, firefighters, beacons }
    }

    /// Advance the simulation one step: wander, drain, occasionally
    /// freeze someone in place.
    fn tick(&mut self) {
        for i in 0..self.firefighters.len() {
            let frozen = self.firefighters[i].frozen_ticks;
            if frozen > 0 {
                self.firefighters[i].frozen_ticks = frozen - 1;
            } else {
                let dlat = (self.rng.unit() - 0.5) * 0.0002;
                let dlon = (self.rng.unit() - 0.5) * 0.0002;
                let ff = &mut self.firefighters[i];
                ff.lat += dlat;
                ff.lon += dlon;
            }
            let hr_jitter = (self.rng.unit() - 0.5) * 10.0;
            let freeze = self.firefighters[i].frozen_ticks == 0 && self.rng.chance(2);
            let ff = &mut self.firefighters[i];
            ff.heart_rate = (ff.heart_rate + hr_jitter).clamp(60.0, 200.0);
            ff.scba_pressure = (ff.scba_pressure - 0.4).max(0.0);
            ff.battery = (ff.battery - 0.05).max(0.0);
            if freeze {
                // long enough to cross the 30s stationarity threshold
                ff.frozen_ticks = 30;
            }
        }
        for i in 0..self.beacons.len() {
            let drain = self.rng.unit() * 0.02;
            self.beacons[i].battery = (self.beacons[i].battery - drain).max(0.0);
        }
    }

    fn gps_value(rng: &mut XorShift64, lat: f64, lon: f64) -> Value {
        if rng.chance(50) {
            json!([lat, lon])
        } else {
            json!({"lat": lat, "lon": lon})
        }
    }

    fn firefighter_payload(&mut self) -> Value {
        self.tick();
        let mut records: Vec<Value> = Vec::with_capacity(self.firefighters.len());
        for i in 0..self.firefighters.len() {
            let nested = self.rng.chance(60);
            let drop_gps = self.rng.chance(10);
            let gps = {
                let (lat, lon) = (self.firefighters[i].lat, self.firefighters[i].lon);
                Self::gps_value(&mut self.rng, lat, lon)
            };
            let ff = &self.firefighters[i];
            let mut record = json!({"tag_id": ff.tag});
            if nested {
                record["firefighter"] =
                    json!({"name": ff.name, "badge_number": ff.tag, "team": ff.team});
                record["vitals"] = json!({
                    "heart_rate_bpm": ff.heart_rate,
                    "skin_temperature_c": 36.5,
                });
                record["scba"] = json!({"cylinder_pressure_bar": ff.scba_pressure});
                record["device"] = json!({"battery_percent": ff.battery});
                record["environment"] = json!({"o2_percent": 20.8, "co_ppm": 3});
            } else {
                record["name"] = json!(ff.name);
                record["team"] = json!(ff.team);
                record["vitals"] = json!({
                    "hr": ff.heart_rate,
                    "temp": 36.5,
                    "scba": ff.scba_pressure,
                    "battery": ff.battery,
                });
            }
            if !drop_gps {
                record["position"] = json!({"gps": gps, "floor": ff.floor});
            }
            records.push(record);
        }
        // the occasional junk element the normalizer must skip
        if self.rng.chance(15) {
            records.push(json!("telemetry-noise"));
        }
        self.wrap(records, "firefighters")
    }

    fn beacon_payload(&mut self) -> Value {
        let mut records: Vec<Value> = Vec::with_capacity(self.beacons.len());
        for i in 0..self.beacons.len() {
            // a beacon sometimes drops out of the feed entirely
            if self.rng.chance(5) {
                continue;
            }
            let gps = {
                let (lat, lon) = (self.beacons[i].lat, self.beacons[i].lon);
                Self::gps_value(&mut self.rng, lat, lon)
            };
            let signal: Value = if self.rng.chance(50) {
                json!(["excellent", "good", "fair", "poor"][self.rng.below(4) as usize])
            } else {
                json!(self.rng.below(101))
            };
            let beacon = &self.beacons[i];
            records.push(json!({
                "beacon_id": beacon.beacon_id,
                "name": beacon.name,
                "position": {"gps": gps, "floor": beacon.floor},
                "status": {
                    "battery_percent": beacon.battery,
                    "signal_quality": signal,
                    "tags_in_range": self.rng.below(4),
                    "is_online": true,
                },
            }));
        }
        self.wrap(records, "beacons")
    }

    fn alert_payload(&mut self) -> Value {
        let mut records: Vec<Value> = Vec::new();
        if self.rng.chance(5) && !self.firefighters.is_empty() {
            let idx = self.rng.below(self.firefighters.len() as u64) as usize;
            records.push(json!({
                "alert_type": "sos_pressed",
                "tag_id": self.firefighters[idx].tag,
            }));
        }
        self.wrap(records, "alerts")
    }

    /// Randomly pick one of the top-level shapes the real feed produces.
    fn wrap(&mut self, records: Vec<Value>, section: &str) -> Value {
        match self.rng.below(4) {
            0 => Value::Array(records),
            1 => json!({section: records}),
            2 => json!({"data": records}),
            _ => json!({"items": records, "meta": {"version": 2}}),
        }
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<Mutex<SimState>>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let payload = match (req.method(), req.uri().path()) {
        (&Method::GET, "/firefighters") => Some(state.lock().await.firefighter_payload()),
        (&Method::GET, "/beacons") => Some(state.lock().await.beacon_payload()),
        (&Method::GET, "/alerts") => Some(state.lock().await.alert_payload()),
        _ => None,
    };

    let response = match payload {
        Some(payload) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(payload.to_string())))
            .expect("static response should not fail"),
        None => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail"),
    };
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let state = Arc::new(Mutex::new(SimState::new(
        args.seed,
        args.firefighters,
        args.beacons,
    )));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;
    println!(
        "firewatch-sim listening on {addr} ({} firefighters, {} beacons)",
        args.firefighters, args.beacons
    );

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = state.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { handle_request(req, state).await }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                eprintln!("sim http error: {e}");
            }
        });
    }
}
