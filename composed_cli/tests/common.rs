use assert_cmd::Command;
use insta_cmd::get_cargo_bin;

pub fn composed_cmd() -> Command {
	let mut cmd = Command::new(get_cargo_bin("composed"));
	cmd.env("NO_COLOR", "1");
	cmd.env_remove("RUST_LOG");
	cmd
}

#[allow(dead_code)]
pub fn write_config(root: &std::path::Path, content: &str) -> std::io::Result<()> {
	std::fs::write(root.join("composed.toml"), content)
}
