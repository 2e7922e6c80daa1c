use crate::fleet::types::{DeliveryStat, TruckLocation, TruckRecord, TruckStatus};
use chrono::{Duration, SecondsFormat, Utc};

struct SeedTruck {
    id: &'static str,
    driver: &'static str,
    photo: &'static str,
    plate_number: &'static str,
    capacity: f64,
    status: TruckStatus,
    lat: f64,
    lng: f64,
    address: &'static str,
    minutes_ago: i64,
    current_load: f64,
    fuel_level: f64,
}

const SEED_TRUCKS: [SeedTruck; 8] = [
    SeedTruck {
        id: "1",
        driver: "Budi Santoso",
        photo: "photo-1517841905240-472988babdf9",
        plate_number: "B 1234 ABC",
        capacity: 5_000.0,
        status: TruckStatus::Active,
        lat: -6.2088,
        lng: 106.8456,
        address: "Jakarta Pusat, DKI Jakarta",
        minutes_ago: 0,
        current_load: 3_500.0,
        fuel_level: 75.0,
    },
    SeedTruck {
        id: "2",
        driver: "Ahmad Hidayat",
        photo: "photo-1524504388940-b1c1722653e1",
        plate_number: "B 5678 DEF",
        capacity: 7_000.0,
        status: TruckStatus::Active,
        lat: -6.1751,
        lng: 106.8650,
        address: "Jakarta Timur, DKI Jakarta",
        minutes_ago: 5,
        current_load: 6_800.0,
        fuel_level: 60.0,
    },
    SeedTruck {
        id: "3",
        driver: "Siti Rahma",
        photo: "photo-1531123414780-f9f2b9a8f2b3",
        plate_number: "B 9012 GHI",
        capacity: 3_000.0,
        status: TruckStatus::Idle,
        lat: -6.2297,
        lng: 106.8320,
        address: "Jakarta Selatan, DKI Jakarta",
        minutes_ago: 15,
        current_load: 0.0,
        fuel_level: 90.0,
    },
    SeedTruck {
        id: "4",
        driver: "Andi Wijaya",
        photo: "photo-1506794778202-cad84cf45f1d",
        plate_number: "B 3456 JKL",
        capacity: 10_000.0,
        status: TruckStatus::Active,
        lat: -6.1862,
        lng: 106.7980,
        address: "Jakarta Barat, DKI Jakarta",
        minutes_ago: 0,
        current_load: 9_500.0,
        fuel_level: 45.0,
    },
    SeedTruck {
        id: "5",
        driver: "Rina Putri",
        photo: "photo-1544005313-94ddf0286df2",
        plate_number: "B 7890 MNO",
        capacity: 5_000.0,
        status: TruckStatus::Maintenance,
        lat: -6.1389,
        lng: 106.8133,
        address: "Jakarta Utara, DKI Jakarta",
        minutes_ago: 120,
        current_load: 0.0,
        fuel_level: 25.0,
    },
    SeedTruck {
        id: "6",
        driver: "Dedi Kurniawan",
        photo: "photo-1500648767791-00dcc994a43e",
        plate_number: "D 1122 PQR",
        capacity: 8_000.0,
        status: TruckStatus::Active,
        lat: -6.9175,
        lng: 107.6191,
        address: "Bandung, Jawa Barat",
        minutes_ago: 2,
        current_load: 5_000.0,
        fuel_level: 70.0,
    },
    SeedTruck {
        id: "7",
        driver: "Hendra Setiawan",
        photo: "photo-1545996124-1ec1d51f7c1d",
        plate_number: "L 3344 STU",
        capacity: 6_000.0,
        status: TruckStatus::Offline,
        lat: -7.7956,
        lng: 110.3695,
        address: "Surabaya, Jawa Timur",
        minutes_ago: 180,
        current_load: 4_000.0,
        fuel_level: 20.0,
    },
    SeedTruck {
        id: "8",
        driver: "Wati Kusuma",
        photo: "photo-1547425260-76bcadfb4f2c",
        plate_number: "B 5566 VWX",
        capacity: 4_500.0,
        status: TruckStatus::Active,
        lat: -6.2615,
        lng: 106.7810,
        address: "Tangerang, Banten",
        minutes_ago: 0,
        current_load: 3_000.0,
        fuel_level: 85.0,
    },
];

const SEED_DELIVERY_STATS: [(&str, u32, u32, u32); 7] = [
    ("2025-10-08", 45, 42, 3),
    ("2025-10-09", 52, 48, 4),
    ("2025-10-10", 38, 36, 2),
    ("2025-10-11", 61, 58, 3),
    ("2025-10-12", 49, 45, 4),
    ("2025-10-13", 55, 53, 2),
    ("2025-10-14", 58, 55, 3),
];

/// Demo fleet used by the in-memory truck source.
pub fn seed_trucks() -> Vec<TruckRecord> {
    let now = Utc::now();
    SEED_TRUCKS
        .iter()
        .map(|seed| TruckRecord {
            id: seed.id.to_string(),
            driver: seed.driver.to_string(),
            plate_number: seed.plate_number.to_string(),
            capacity: seed.capacity,
            status: seed.status,
            photo_url: Some(format!(
                "https://images.unsplash.com/{}?w=200&q=80&auto=format&fit=crop",
                seed.photo
            )),
            location: TruckLocation {
                lat: seed.lat,
                lng: seed.lng,
                address: seed.address.to_string(),
            },
            last_seen: (now - Duration::minutes(seed.minutes_ago))
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            current_load: seed.current_load,
            fuel_level: Some(seed.fuel_level),
        })
        .collect()
}

/// One week of daily delivery counts served by the in-memory truck source.
pub fn seed_delivery_stats() -> Vec<DeliveryStat> {
    SEED_DELIVERY_STATS
        .iter()
        .map(|&(date, deliveries, on_time, delayed)| DeliveryStat {
            date: date.to_string(),
            deliveries,
            on_time,
            delayed,
        })
        .collect()
}
