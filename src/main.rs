// PAWL
//
// A rust implementation of a TACACS+ Protocol "client"
// as defined by RFC8907 and related.
//
// (C) 2025 - T.J. Hampton
//

use libc::{mlockall, MCL_CURRENT, MCL_FUTURE, MCL_ONFAULT};

use std::env;
use std::io::stdin;
use std::io::stdout;
use std::io::Write;
use std::process::exit;
use std::process::Command;
use std::time::Duration;

use flex_alloc_secure::alloc::SecureAlloc;
use flex_alloc_secure::boxed::ProtectedBox;
use flex_alloc_secure::flex_alloc;
use precis_profiles::precis_core::profile::Profile;
use precis_profiles::UsernameCasePreserved;
use rand::Rng;

use pawl::PLAuthenSess;
use pawl::PLTACVersion;

struct PLClientSettings {
    pl_client_i18n: bool,
    pl_client_use_pap: bool,
}

impl PLClientSettings {
    fn new(pl_client_i18n: bool, pl_client_use_pap: bool) -> Self {
        Self {
            pl_client_i18n,
            pl_client_use_pap,
        }
    }
}

/// # Panics
///
/// Panics if the configured secret command cannot be executed
///
#[tokio::main]
pub async fn main() {
    let mut client_settings = PLClientSettings::new(true, false);

    println!("Pawl Info: starting...");

    let mut custom_secret_cmd = String::new();
    let mut custom_hostport = String::from("127.0.0.1:49");
    let mut custom_user = String::new();
    let mut custom_port_name = String::from("pawl_tty0");
    let mut custom_rem_addr = String::from("pawl_device");
    for (key, value) in env::vars() {
        if key == "PAWL_READ_SECRET" {
            custom_secret_cmd = value; // Directly assign the value
        } else if key == "PAWL_CUST_HOSTPORT" {
            custom_hostport = value; // Directly assign the value
        } else if key == "PAWL_USER" {
            custom_user = value; // Directly assign the value
        } else if key == "PAWL_PORT_NAME" {
            custom_port_name = value;
        } else if key == "PAWL_REM_ADDR" {
            custom_rem_addr = value;
        }
    }

    let mut secret = String::new();
    if !custom_secret_cmd.is_empty() {
        // Use the configured command to obtain the shared secret.
        secret = pl_obtain_secret(custom_secret_cmd.as_str());
    }

    // Check if the specific argument is present
    if env::args().any(|x| x == *"--use-insecure-test-secret-do-not-use".to_string()) {
        secret = "testing123".to_string();
    }

    if env::args().any(|x| x == *"--ignore-i18n".to_string()) {
        client_settings.pl_client_i18n = false;
    }

    if env::args().any(|x| x == *"--use-pap".to_string()) {
        client_settings.pl_client_use_pap = true;
    }

    if secret.is_empty() {
        println!("Pawl Error: no shared secret configured, set PAWL_READ_SECRET");
        exit(2);
    }

    let result = unsafe { mlockall(MCL_CURRENT | MCL_FUTURE | MCL_ONFAULT) };
    if result != 0 {
        eprintln!("mlockall failed with error code: {}", result);
    } else {
        println!("mlockall succeeded");
    }

    ctrlc::set_handler(|| {
        println!("Pawl Info: interrupted, abandoning session.");
        exit(130);
    })
    .expect("Error setting Ctrl-C handler");

    let raw_username = if custom_user.is_empty() {
        pl_prompt_line("Username: ")
    } else {
        custom_user
    };

    let username = if client_settings.pl_client_i18n {
        let username_case_preserved: UsernameCasePreserved = UsernameCasePreserved::new();
        match username_case_preserved.prepare(raw_username) {
            Ok(fixed_username) => {
                println!("Pawl Debug: Offering username {}", fixed_username);
                fixed_username.to_string()
            }
            Err(e) => {
                println!("Pawl Error: Invalid username passed, {}", e);
                exit(2);
            }
        }
    } else {
        raw_username
    };

    if username.is_empty() {
        println!("Pawl Error: refusing to authenticate an empty username");
        exit(2);
    }

    // TODO: suppress terminal echo while the password is typed
    let password = pl_prompt_line("Password: ");

    let mut key_buf: flex_alloc::vec::Vec<u8, SecureAlloc> =
        flex_alloc::vec::Vec::new_in(SecureAlloc);
    key_buf.extend_from_slice(secret.as_bytes());
    let key = ProtectedBox::from(key_buf);

    let ses: u32 = rand::rng().random();

    let mut stream = match tokio::net::TcpStream::connect(custom_hostport.as_str()).await {
        Ok(s) => {
            println!("Pawl Info: Connected to {}", custom_hostport);

            // This shouldn't be bandwidth-intensive enough, prefer latency optimization and disable Nagle's
            match s.set_nodelay(true) {
                Ok(_) => (),
                Err(_) => {
                    println!("Pawl Debug: Couldn't disable Nagles for this Socket, proceeding anyway.");
                }
            };
            s // hand over the TcpStream
        }
        Err(e) => {
            println!("Pawl Error: TCP Error, {}", e);
            exit(2);
        }
    };

    let version = if client_settings.pl_client_use_pap {
        PLTACVersion::TAC_PLUS_MINOR_VER_ONE as u8
    } else {
        PLTACVersion::TAC_PLUS_MINOR_VER_DEFAULT as u8
    };

    let mut authen_sess = PLAuthenSess::new(ses, version, &key);
    println!("Pawl Debug: Opened session {:#010x}", authen_sess.get_session_id());

    // for interactive sessions, the server gets to think this long in total
    let attempt = if client_settings.pl_client_use_pap {
        tokio::time::timeout(
            Duration::from_secs(30),
            authen_sess.do_pap_login(
                &mut stream,
                username.as_bytes(),
                password.as_bytes(),
                custom_port_name.as_bytes(),
                custom_rem_addr.as_bytes(),
            ),
        )
        .await
    } else {
        tokio::time::timeout(
            Duration::from_secs(30),
            authen_sess.do_ascii_login(
                &mut stream,
                username.as_bytes(),
                password.as_bytes(),
                custom_port_name.as_bytes(),
                custom_rem_addr.as_bytes(),
            ),
        )
        .await
    };

    match attempt {
        Ok(Ok(true)) => {
            println!("Pawl Info: Authentication PASS for {}", username);
            exit(0);
        }
        Ok(Ok(false)) => {
            println!("Pawl Info: Authentication FAIL for {}", username);
            exit(1);
        }
        Ok(Err(e)) => {
            println!("Pawl Error: {}", e);
            exit(2);
        }
        Err(_) => {
            println!("Pawl Error: server conversation timed out");
            exit(2);
        }
    }
}

fn pl_prompt_line(prompt: &str) -> String {
    print!("{}", prompt);
    match stdout().flush() {
        Ok(_) => (),
        Err(_) => (),
    }

    let mut line = String::new();
    match stdin().read_line(&mut line) {
        Ok(_) => (),
        Err(e) => {
            println!("Pawl Error: could not read from terminal, {}", e);
            exit(2);
        }
    }

    line.trim_end_matches(['\r', '\n']).to_string()
}

/// For a user-specified shell command string,
/// expect the shared secret on the first line of output.
///
fn pl_obtain_secret(cmd: &str) -> String {
    let output = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .output()
        .expect("Failed to execute configured command.");

    let data_str = String::from_utf8_lossy(&output.stdout);

    match data_str.lines().next() {
        Some(line) => line.trim().to_string(),
        None => String::new(),
    }
}
