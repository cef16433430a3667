use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "account-cli")]
#[command(about = "Command-line client for the account service", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service liveness
    Health,
    /// Create a new account
    Register {
        username: String,
        email: String,
        password: String,
    },
    /// Log in and print the issued token
    Login { username: String, password: String },
    /// Change the password of the account the token belongs to
    ChangePassword {
        #[arg(short, long)]
        token: String,
        old_password: String,
        new_password: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static("account-cli"));
    let client = reqwest::Client::builder().default_headers(headers).build()?;

    let res = match cli.command {
        Commands::Health => client.get(format!("{}/health", cli.url)).send().await?,
        Commands::Register {
            username,
            email,
            password,
        } => {
            client
                .post(format!("{}/api/v1/users/register", cli.url))
                .json(&json!({ "username": username, "email": email, "password": password }))
                .send()
                .await?
        }
        Commands::Login { username, password } => {
            client
                .post(format!("{}/api/v1/users/login", cli.url))
                .json(&json!({ "username": username, "password": password }))
                .send()
                .await?
        }
        Commands::ChangePassword {
            token,
            old_password,
            new_password,
        } => {
            client
                .put(format!("{}/api/v1/users/password", cli.url))
                .header(AUTHORIZATION, format!("Bearer {token}"))
                .json(&json!({ "old_password": old_password, "new_password": new_password }))
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: service returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
