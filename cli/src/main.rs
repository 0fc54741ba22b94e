use std::io::Write;
use core::convert::TryInto;
use base64::Engine;
use bitcoin::key::Keypair;
use bitcoin::Amount;
use marygoround_core::association::{Association, Error, MemberId, SharedAssociation};
use marygoround_core::association::member::generate_key_pair;
use secp256k1::SECP256K1;
use slog::{info, o, Drain, Logger};

/// Environment variable overriding the clock, useful for simulating the passage of time.
const NOW_VAR: &str = "MARYGOROUND_NOW";

fn logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build();
    let drain = slog::LevelFilter::new(drain, slog::Level::Info);
    let drain = std::sync::Mutex::new(drain).fuse();
    Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}

fn now() -> u64 {
    match std::env::var_os(NOW_VAR) {
        Some(time) => {
            let time = time.into_string().expect("time is not UTF-8");
            let time = chrono::DateTime::parse_from_rfc3339(&time)
                .expect("failed to parse time - the format has to be RFC 3339")
                .timestamp();
            time.try_into().expect("time is before 1970")
        },
        None => {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("misconfigured system time (before 1970)")
                .as_secs()
        },
    }
}

fn parse_amount(args: &mut std::env::ArgsOs) -> Amount {
    args.next()
        .expect("missing amount")
        .into_string()
        .expect("amount is not UTF-8")
        .parse::<Amount>()
        .expect("invalid amount (use a denomination, e.g. \"0.5 BTC\" or \"1000 sat\")")
}

fn parse_member_id(args: &mut std::env::ArgsOs) -> MemberId {
    args.next()
        .expect("missing member id")
        .into_string()
        .expect("member id is not UTF-8")
        .parse::<MemberId>()
        .expect("invalid member id")
}

fn load_key(path: &std::ffi::OsStr) -> Keypair {
    let key_bytes = std::fs::read(path).expect("failed to read key file");
    if key_bytes.len() != 32 {
        panic!("invalid key file (expected 32 bytes, got {})", key_bytes.len());
    }
    Keypair::from_seckey_slice(SECP256K1, &key_bytes).expect("invalid key file")
}

fn load_caller(args: &mut std::env::ArgsOs) -> MemberId {
    let key_file = args.next().expect("missing key file");
    MemberId::from_key_pair(&load_key(&key_file))
}

fn load_state(path: &std::ffi::OsStr, logger: &Logger) -> Association {
    let bytes = std::fs::read(path).expect("failed to read state file");
    let mut bytes = &*bytes;
    let association = Association::deserialize(&mut bytes, logger.clone())
        .unwrap_or_else(|error| panic!("invalid state file: {}", error));
    if !bytes.is_empty() {
        panic!("invalid state file: {} trailing bytes", bytes.len());
    }
    association
}

/// Runs a ledger command and stores the new state if it succeeded.
///
/// Prints the events emitted by the command. A rejected command leaves the state file untouched
/// and terminates the process with a non-zero status.
fn update_state<F>(mut args: std::env::ArgsOs, command: F) where F: FnOnce(&SharedAssociation, MemberId, &mut std::env::ArgsOs) -> Result<(), Error> {
    let logger = logger();
    let state_file = args.next().expect("missing state file");
    let association = load_state(&state_file, &logger);
    let previous_events = association.events().len();
    let caller = load_caller(&mut args);

    let shared = SharedAssociation::new(association);
    let result = command(&shared, caller, &mut args);
    let association = match shared.try_unwrap() {
        Ok(association) => association,
        Err(_) => unreachable!("the command doesn't keep the handle"),
    };
    if let Err(error) = result {
        eprintln!("rejected: {}", error);
        std::process::exit(1);
    }

    let mut state = Vec::new();
    association.serialize(&mut state);
    atomic_update(&state_file, &state);
    info!(association.logger(), "state updated"; "state_file" => ?state_file);
    for event in &association.events()[previous_events..] {
        println!("{}", event);
    }
}

fn write_non_existing(path: &std::ffi::OsStr, data: &[u8]) {
    let mut file = std::fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)
        .unwrap_or_else(|error| panic!("failed to open {:?}: {:?}", path, error));
    file.write_all(data).expect("failed to write");
}

fn atomic_update(path: &std::ffi::OsStr, data: &[u8]) {
    let mut tmp_state_file = path.to_owned();
    tmp_state_file.push(".tmp");
    // we want to call sync, so we create `File` manually
    let mut file = std::fs::File::create(&tmp_state_file).expect("failed to open temporary state file");
    file.write_all(data).expect("failed to write new state");
    file.sync_data().expect("failed to ensure the file is on disk");
    drop(file);
    std::fs::rename(tmp_state_file, path).expect("failed to commit the state file");
}

fn init(mut args: std::env::ArgsOs) {
    let logger = logger();
    let state_file = args.next().expect("missing state file");
    let owner = load_caller(&mut args);
    let association = Association::new(owner, now(), logger);
    let mut state = Vec::new();
    association.serialize(&mut state);
    write_non_existing(&state_file, &state);
    println!("Owner: {}", owner);
}

fn member(mut args: std::env::ArgsOs) {
    let command = args.next()
        .expect("missing subcommand (add)")
        .into_string()
        .expect("unrecognized command");

    match &*command {
        "add" => update_state(args, |association, caller, args| {
            let member = parse_member_id(args);
            association.add_member(caller, member)
        }),
        _ => panic!("unknown command \"{}\"", command),
    }
}

fn save(args: std::env::ArgsOs) {
    update_state(args, |association, caller, args| {
        let amount = parse_amount(args);
        association.save(caller, amount)
    })
}

fn loan_quote(mut args: std::env::ArgsOs) {
    let state_file = args.next().expect("missing state file");
    let association = load_state(&state_file, &logger());
    let caller = load_caller(&mut args);
    match association.repayment_quote(&caller, now()) {
        Ok(quote) => {
            println!("Principal: {}", quote.principal);
            println!("Days since issuance: {}", quote.elapsed / marygoround_core::association::policy::DAY);
            println!("Interest rate: {}%", quote.rate.percent);
            println!("Interest: {}", quote.interest);
            println!("Total to repay: {}", quote.total);
            if quote.rate.delinquent {
                println!();
                println!("=========================================================");
                println!("!!! WARNING !!!");
                println!("The loan is delinquent!");
                println!("Repaying it removes you from the association and your");
                println!("savings are forfeited.");
                println!("=========================================================");
            }
        },
        Err(error) => {
            eprintln!("rejected: {}", error);
            std::process::exit(1);
        },
    }
}

fn loan(mut args: std::env::ArgsOs) {
    let command = args.next()
        .expect("missing subcommand (request, quote, repay)")
        .into_string()
        .expect("unrecognized command");

    match &*command {
        "request" => update_state(args, |association, caller, args| {
            let amount = parse_amount(args);
            association.request_loan(caller, amount, now())
        }),
        "quote" => loan_quote(args),
        "repay" => update_state(args, |association, caller, args| {
            let amount = parse_amount(args);
            association.repay_loan(caller, amount, now())
        }),
        _ => panic!("unknown command \"{}\"", command),
    }
}

fn distribute(args: std::env::ArgsOs) {
    update_state(args, |association, caller, _| association.distribute_funds(caller, now()))
}

fn show(mut args: std::env::ArgsOs) {
    let subject = args.next()
        .expect("missing subject (totals, member, members, events)")
        .into_string()
        .expect("unrecognized subject");
    let state_file = args.next().expect("missing state file");
    let association = load_state(&state_file, &logger());

    match &*subject {
        "totals" => {
            let (savings, loaned, available) = association.all_savings_and_loans();
            println!("Owner: {}", association.owner());
            println!("Members: {}", association.member_list().len());
            println!("Total savings: {}", savings);
            println!("Total loaned: {}", loaned);
            println!("Available funds: {}", available);
            println!("Interest pool: {}", association.interest_pool());
            let next_distribution = association.last_distribution_time()
                .saturating_add(association.policy().distribution_period);
            let next_distribution: i64 = next_distribution.try_into().expect("time out of range");
            let next_distribution = chrono::DateTime::from_timestamp(next_distribution, 0)
                .expect("time out of range");
            println!("Next distribution: {}", next_distribution.to_rfc3339());
        },
        "member" => {
            let id = parse_member_id(&mut args);
            let (savings, loan, last_loan_time) = association.my_savings_and_loan(&id);
            println!("Member: {}", association.is_member(&id));
            println!("Savings: {}", savings);
            println!("Loan: {}", loan);
            if loan > Amount::ZERO {
                let last_loan_time: i64 = last_loan_time.try_into().expect("time out of range");
                let last_loan_time = chrono::DateTime::from_timestamp(last_loan_time, 0)
                    .expect("time out of range");
                println!("Loan issued: {}", last_loan_time.to_rfc3339());
            }
        },
        "members" => {
            for id in association.member_list() {
                let (savings, loan, _) = association.my_savings_and_loan(id);
                println!("{} savings: {} loan: {}", id, savings, loan);
            }
        },
        "events" => {
            for event in association.events() {
                println!("{}", event);
            }
        },
        _ => panic!("unknown subject \"{}\"", subject),
    }
}

fn export(mut args: std::env::ArgsOs) {
    let state_file = args.next().expect("missing state file");
    // validate before handing it out
    let association = load_state(&state_file, &logger());
    let mut state = Vec::new();
    association.serialize(&mut state);
    println!("{}", base64::engine::general_purpose::STANDARD.encode(state));
}

fn key_gen(mut args: std::env::ArgsOs) {
    let key_file = args.next()
        .expect("missing key file");

    let key_pair = generate_key_pair();
    write_non_existing(&key_file, &key_pair.secret_bytes());

    println!("{}", MemberId::from_key_pair(&key_pair));
}

fn key_gen_mnemonic(mut args: std::env::ArgsOs) {
    let key_file = args.next()
        .expect("missing key file");
    let mnemonic = match args.next() {
        Some(seed) => {
            seed.into_string().expect("seed is not UTF-8").parse().expect("invalid seed")
        },
        None => {
            let entropy = secp256k1::rand::random::<[u8; 16]>();
            bip39::Mnemonic::from_entropy(&entropy).expect("correct entropy length")
        },
    };
    let seed = mnemonic.to_seed("");
    let xpriv = bitcoin::bip32::Xpriv::new_master(bitcoin::Network::Bitcoin, &seed).expect("failed to create xpriv");
    let key_pair = xpriv.to_keypair(&SECP256K1);
    println!("seed: {}", mnemonic);
    println!("id: {}", MemberId::from_key_pair(&key_pair));
    write_non_existing(&key_file, &key_pair.secret_bytes())
}

fn key_show(mut args: std::env::ArgsOs) {
    let key_file = args.next()
        .expect("missing key file");
    println!("{}", MemberId::from_key_pair(&load_key(&key_file)));
}

fn key(mut args: std::env::ArgsOs) {
    let command = args.next()
        .expect("missing subcommand (gen, gen-mnemonic, show)")
        .into_string()
        .expect("unrecognized command");

    match &*command {
        "gen" => key_gen(args),
        "gen-mnemonic" => key_gen_mnemonic(args),
        "show" => key_show(args),
        _ => panic!("unknown command \"{}\"", command),
    }
}

fn main() {
    let mut args = std::env::args_os();
    let _program_name = args.next().expect("missing program name");
    let command = args.next()
        .expect("missing subcommand (key, init, member, save, loan, distribute, show, export)")
        .into_string()
        .expect("unrecognized command");

    match &*command {
        "key" => key(args),
        "init" => init(args),
        "member" => member(args),
        "save" => save(args),
        "loan" => loan(args),
        "distribute" => distribute(args),
        "show" => show(args),
        "export" => export(args),
        _ => panic!("unknown command \"{}\"", command),
    }
}
