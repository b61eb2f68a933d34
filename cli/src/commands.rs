use std::io::Write;

use lapcounter_core::ServiceHandle;
use lapcounter_core::config::parse_divisor;

use crate::render::render_table;

pub async fn select_directory(handle: &ServiceHandle, path: &str) {
    match handle.select_directory(path).await {
        Ok(()) => println!("Watching {}", path),
        Err(e) => println!("Directory not selected: {}", e),
    }
}

pub async fn set_filter_code(handle: &ServiceHandle, code: &str) {
    match handle.set_filter_code(code).await {
        Ok(()) => println!("Counting control code {}", code.trim()),
        Err(e) => println!("Filter not changed: {}", e),
    }
}

pub async fn set_stage_divisor(handle: &ServiceHandle, input: &str) {
    let result = match parse_divisor(input) {
        Ok(n) => handle.set_stage_divisor(n).await,
        Err(e) => Err(e.into()),
    };
    match result {
        Ok(()) => println!("Stage divisor set to {}", input.trim()),
        Err(e) => println!("Divisor not changed: {}", e),
    }
}

pub async fn show(handle: &ServiceHandle) {
    match handle.snapshot().await {
        Ok(snapshot) if snapshot.is_empty() => println!("No cards registered"),
        Ok(snapshot) => print!("{}", render_table(&snapshot)),
        Err(e) => println!("{}", e),
    }
}

pub async fn show_status(handle: &ServiceHandle) {
    let status = match handle.status().await {
        Ok(status) => status,
        Err(e) => {
            println!("{}", e);
            return;
        }
    };

    match &status.directory {
        Some(dir) => println!("directory:     {}", dir.display()),
        None => println!("directory:     (none)"),
    }
    println!("filter code:   {}", status.filter_code);
    println!("stage divisor: {}", status.stage_divisor);
    println!("cards:         {}", status.cards);
    for (path, offset) in &status.files {
        println!("  {} @ {} bytes", path.display(), offset);
    }
}

pub async fn stop(handle: &ServiceHandle) {
    match handle.stop().await {
        Ok(()) => println!("Stopped watching"),
        Err(e) => println!("{}", e),
    }
}

pub async fn exit(handle: &ServiceHandle) {
    let _ = handle.shutdown().await;
    write!(std::io::stdout(), "quitting...").ok();
    std::io::stdout().flush().ok();
}
