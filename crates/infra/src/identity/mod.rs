pub mod discord_client;
