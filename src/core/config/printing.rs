use crate::core::config::data::{path_display, Config, EndpointConfig};

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        println!("  assistant-name: {}", self.assistant_name);
        println!("  response-language: {}", self.response_language);
        println!("  reveal-interval-ms: {}", self.reveal_interval_ms);
        match &self.state_path {
            Some(path) => println!("  state-path: {}", path_display(path)),
            None => println!("  state-path: (default)"),
        }
        print_endpoint("primary", &self.primary);
        print_endpoint("alternate", &self.alternate);
        println!("  voice:");
        println!("    url: {}", self.voice.url);
        println!("    model: {}", self.voice.model);
        println!("    voice-name: {}", self.voice.voice_name);
        println!("    api-key-env: {}", self.voice.api_key_env);
        println!(
            "    input-device: {}",
            self.voice.input_device.as_deref().unwrap_or("(default)")
        );
        println!(
            "    output-device: {}",
            self.voice.output_device.as_deref().unwrap_or("(default)")
        );
    }
}

fn print_endpoint(label: &str, endpoint: &EndpointConfig) {
    let key_state = if endpoint.api_key().is_some() {
        "set"
    } else {
        "missing"
    };
    println!("  {label}:");
    println!("    base-url: {}", endpoint.base_url);
    println!("    model: {}", endpoint.model);
    println!("    api-key-env: {} ({key_state})", endpoint.api_key_env);
}
