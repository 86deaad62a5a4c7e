use chrono::Utc;
use clap::Parser;
use fake::faker::address::en::StreetName;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use rand::Rng;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use fermata::{
    auth::AuthService,
    domain::{Instrument, User},
    repository::{
        InstrumentRepository, SqliteInstrumentRepository, SqliteUserRepository, UserRepository,
    },
};

#[derive(Parser)]
#[command(about = "Seed the fermata database with demo users and instruments")]
struct Args {
    /// Database URL; falls back to DATABASE_URL, then sqlite:fermata.db
    #[arg(long)]
    database_url: Option<String>,

    /// Number of users to create
    #[arg(long, default_value_t = 5)]
    users: usize,

    /// Number of instruments to create
    #[arg(long, default_value_t = 10)]
    instruments: usize,
}

const INSTRUMENT_KINDS: &[&str] = &[
    "Stratocaster", "Telecaster", "Les Paul", "Precision Bass", "Cello",
    "Viola", "Trumpet", "Tenor Sax", "Stage Piano", "Drum Kit",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    println!("🌱 Starting database seeding...");

    let database_url = args
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "sqlite:fermata.db".to_string());

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    let user_repo = SqliteUserRepository::new(db_pool.clone());
    let instrument_repo = SqliteInstrumentRepository::new(db_pool.clone());
    let auth_service = AuthService::new(db_pool.clone());

    println!("👥 Creating {} users...", args.users);
    let mut users = Vec::new();
    for _ in 0..args.users {
        let user = user_repo
            .create(User {
                id: Uuid::new_v4(),
                email: SafeEmail().fake(),
                full_name: Name().fake(),
                created_at: Utc::now(),
            })
            .await?;
        users.push(user);
    }

    println!("🎸 Creating {} instruments...", args.instruments);
    let mut rng = rand::thread_rng();
    for i in 0..args.instruments {
        let owner = &users[i % users.len()];
        let kind = INSTRUMENT_KINDS[i % INSTRUMENT_KINDS.len()];
        let street: String = StreetName().fake();

        instrument_repo
            .create(Instrument {
                id: Uuid::new_v4(),
                owner_id: owner.id,
                title: format!("{} ({})", kind, owner.full_name),
                daily_rate_cents: rng.gen_range(20..200) * 100,
                default_address: format!("{} {}", rng.gen_range(1..200), street),
                created_at: Utc::now(),
            })
            .await?;
    }

    // Mint a session for the first user so the API can be exercised
    // immediately.
    if let Some(user) = users.first() {
        let (_, token) = auth_service.create_session(user.id, 24).await?;
        println!("🔑 Demo session for {} — cookie: session={}", user.email, token);
    }

    println!("✅ Seeding complete.");

    Ok(())
}
