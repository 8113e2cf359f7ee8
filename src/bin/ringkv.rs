use ringkv::client::{PeerClient, RpcError};
use ringkv::proto::Response;
use ringkv::proto::Status;

fn print_usage(program: &str) {
    eprintln!("Usage: {} [options] command [arguments]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -h HOST    Server host (default: 127.0.0.1)");
    eprintln!("  -p PORT    Server port (default: 8001)");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  put KEY VALUE    Store a key/value pair");
    eprintln!("  get KEY          Retrieve the value for a key");
    eprintln!("  delete KEY       Delete a key");
    eprintln!("  ping             Check server connectivity");
    eprintln!("  shutdown         Ask the server to leave the ring and stop");
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut host = "127.0.0.1".to_string();
    let mut port: u16 = 8001;

    let mut index = 1;
    while index < args.len() && args[index].starts_with('-') {
        match args[index].as_str() {
            "-h" if index + 1 < args.len() => {
                host = args[index + 1].clone();
                index += 2;
            }
            "-p" if index + 1 < args.len() => {
                match args[index + 1].parse() {
                    Ok(parsed) => port = parsed,
                    Err(_) => {
                        eprintln!("Invalid port: {}", args[index + 1]);
                        std::process::exit(1);
                    }
                }
                index += 2;
            }
            "--help" => {
                print_usage(&args[0]);
                return;
            }
            other => {
                eprintln!("Unknown option: {}", other);
                print_usage(&args[0]);
                std::process::exit(1);
            }
        }
    }

    if index >= args.len() {
        print_usage(&args[0]);
        std::process::exit(1);
    }

    let command = args[index].clone();
    let command_args = args[index + 1..].to_vec();
    let endpoint = format!("{}:{}", host, port);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let exit = runtime.block_on(execute(&endpoint, &command, &command_args));
    std::process::exit(exit);
}

enum Op {
    Put,
    Get,
    Delete,
}

async fn execute(endpoint: &str, command: &str, args: &[String]) -> i32 {
    let client = PeerClient::default();
    match command {
        "put" => {
            let [key, value] = args else {
                eprintln!("put requires KEY and VALUE arguments");
                return 1;
            };
            match data_op(&client, endpoint, Op::Put, key.as_bytes(), value.as_bytes()).await {
                Ok(Status::Success) => {
                    println!("OK");
                    0
                }
                Ok(status) => {
                    eprintln!("Failed to store key ({:?})", status);
                    1
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    1
                }
            }
        }
        "get" => {
            let [key] = args else {
                eprintln!("get requires a KEY argument");
                return 1;
            };
            match data_op_value(&client, endpoint, Op::Get, key.as_bytes()).await {
                Ok(response) if response.status == Status::Success => {
                    println!("{}", String::from_utf8_lossy(&response.value));
                    0
                }
                Ok(response) if response.status == Status::KeyNotFound => {
                    eprintln!("Key not found");
                    1
                }
                Ok(response) => {
                    eprintln!("Failed to retrieve key ({:?})", response.status);
                    1
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    1
                }
            }
        }
        "delete" => {
            let [key] = args else {
                eprintln!("delete requires a KEY argument");
                return 1;
            };
            match data_op(&client, endpoint, Op::Delete, key.as_bytes(), &[]).await {
                Ok(Status::Success) => {
                    println!("OK");
                    0
                }
                Ok(Status::KeyNotFound) => {
                    eprintln!("Key not found");
                    1
                }
                Ok(status) => {
                    eprintln!("Failed to delete key ({:?})", status);
                    1
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    1
                }
            }
        }
        "ping" => {
            let peer = match ringkv::ring::types::PeerInfo::parse(endpoint) {
                Some(peer) => peer,
                None => {
                    eprintln!("Invalid server endpoint: {}", endpoint);
                    return 1;
                }
            };
            match client.ping(&peer).await {
                Ok(()) => {
                    println!("PONG");
                    0
                }
                Err(e) => {
                    eprintln!("Ping failed: {}", e);
                    1
                }
            }
        }
        "shutdown" => match client.admin_shutdown(endpoint).await {
            Ok(()) => {
                println!("Shutdown requested");
                0
            }
            Err(e) => {
                eprintln!("Failed to send shutdown: {}", e);
                1
            }
        },
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage("ringkv");
            1
        }
    }
}

async fn data_op(
    client: &PeerClient,
    endpoint: &str,
    op: Op,
    key: &[u8],
    value: &[u8],
) -> Result<Status, RpcError> {
    send_op(client, endpoint, &op, key, value)
        .await
        .map(|response| response.status)
}

async fn data_op_value(
    client: &PeerClient,
    endpoint: &str,
    op: Op,
    key: &[u8],
) -> Result<Response, RpcError> {
    send_op(client, endpoint, &op, key, &[]).await
}

/// Runs one data operation against `endpoint`, following a single REDIRECT
/// to the responsible node if the server answers with one.
async fn send_op(
    client: &PeerClient,
    endpoint: &str,
    op: &Op,
    key: &[u8],
    value: &[u8],
) -> Result<Response, RpcError> {
    let mut response = match op {
        Op::Put => client.put(endpoint, key, value).await?,
        Op::Get => client.get(endpoint, key).await?,
        Op::Delete => client.delete(endpoint, key).await?,
    };
    if response.status == Status::Redirect {
        let target = String::from_utf8_lossy(&response.value).to_string();
        response = match op {
            Op::Put => client.put(&target, key, value).await?,
            Op::Get => client.get(&target, key).await?,
            Op::Delete => client.delete(&target, key).await?,
        };
    }
    Ok(response)
}
