//! Command-line entry points.
//!
//! `view` opens the interactive window; `snapshot` renders a single frame
//! headlessly to a PNG; `inspect` prints scene statistics and the material
//! inventory; `export-settings` and `generate-code` work on settings files
//! without touching the GPU.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use crate::gpu::renderer::Renderer;
use crate::input::InputState;
use crate::inspector::{self, SceneTree};
use crate::model;
use crate::session::ViewerSession;
use crate::settings::SettingsRecord;
use crate::store::{self, SettingsStore};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive viewer window
    View {
        /// OBJ model files to load
        #[arg(required = false)]
        models: Vec<PathBuf>,

        /// Equirectangular HDR environment map
        #[arg(long)]
        hdr: Option<PathBuf>,

        /// Settings JSON to apply at startup (otherwise the store is tried)
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Window width
        #[arg(long, default_value_t = 1280)]
        width: u32,

        /// Window height
        #[arg(long, default_value_t = 720)]
        height: u32,
    },

    /// Render a single frame to a PNG without opening a window
    Snapshot {
        /// OBJ model files to load
        #[arg(required = true)]
        models: Vec<PathBuf>,

        /// Output PNG path
        #[arg(long, default_value = "snapshot.png")]
        out: PathBuf,

        /// Equirectangular HDR environment map
        #[arg(long)]
        hdr: Option<PathBuf>,

        /// Settings JSON to apply
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Output width
        #[arg(long, default_value_t = 1280)]
        width: u32,

        /// Output height
        #[arg(long, default_value_t = 720)]
        height: u32,
    },

    /// Print scene statistics and materials for the given models
    Inspect {
        /// OBJ model files to load
        #[arg(required = true)]
        models: Vec<PathBuf>,
    },

    /// Write current settings (store contents, or defaults) to a JSON file
    ExportSettings {
        /// Output path
        out: PathBuf,
    },

    /// Print procedural setup code for a settings file
    GenerateCode {
        /// Settings JSON file (defaults are used when omitted)
        settings: Option<PathBuf>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::View { models, hdr, settings, width, height } => {
            run_viewer(models, hdr, settings, width, height)
        }
        Commands::Snapshot { models, out, hdr, settings, width, height } => {
            pollster::block_on(render_snapshot(models, out, hdr, settings, width, height))
        }
        Commands::Inspect { models } => run_inspect(models),
        Commands::ExportSettings { out } => {
            let record = SettingsStore::default_location()
                .load()
                .map_err(|e| anyhow!("{}", e))?
                .unwrap_or_default();
            store::export_file(&record, &out)?;
            println!("Wrote {}", out.display());
            Ok(())
        }
        Commands::GenerateCode { settings } => {
            let record = match settings {
                Some(path) => store::import_file(&path).map_err(|e| anyhow!("{}", e))?,
                None => SettingsRecord::default(),
            };
            print!("{}", record.generate_code());
            Ok(())
        }
    }
}

/// Build a session with the requested assets and settings applied.
fn prepare_session(
    models: Vec<PathBuf>,
    hdr: Option<PathBuf>,
    settings: Option<PathBuf>,
    use_store: bool,
) -> Result<ViewerSession> {
    let mut session = ViewerSession::new();

    match settings {
        Some(path) => {
            let record = store::import_file(&path).map_err(|e| anyhow!("{}", e))?;
            session.apply_settings(&record);
            log::info!("applied settings from {}", path.display());
        }
        None if use_store => {
            match SettingsStore::default_location().load() {
                Ok(Some(record)) => {
                    session.apply_settings(&record);
                    log::info!("applied stored settings");
                }
                Ok(None) => {}
                Err(e) => log::warn!("ignoring stored settings: {}", e),
            }
        }
        None => {}
    }

    for path in models {
        session.request_model_load(path);
    }
    if let Some(path) = hdr {
        session.request_environment_load(path);
    }
    Ok(session)
}

/// Block until the requested asset loads resolve, or the first failure, or
/// a timeout.
fn drain_loads(session: &mut ViewerSession, expected: usize) {
    let deadline = Instant::now() + std::time::Duration::from_secs(30);
    loop {
        session.pump_loads();
        let loaded = session.models.len() + session.environment_map.is_some() as usize;
        if loaded >= expected || session.last_error.is_some() || Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    if let Some(err) = &session.last_error {
        log::error!("load failed: {}", err);
    }
}

// ============================================================================
// view
// ============================================================================

fn run_viewer(
    models: Vec<PathBuf>,
    hdr: Option<PathBuf>,
    settings: Option<PathBuf>,
    width: u32,
    height: u32,
) -> Result<()> {
    let mut session = prepare_session(models, hdr, settings, true)?;
    let mut input = InputState::new();

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("maquette")
            .with_inner_size(winit::dpi::PhysicalSize::new(width, height))
            .build(&event_loop)?,
    );

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let surface = instance.create_surface(window.clone())?;
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: Some(&surface),
        force_fallback_adapter: false,
    }))
    .ok_or_else(|| anyhow!("No compatible graphics adapter found"))?;
    let (device, queue) =
        pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None))?;

    let capabilities = surface.get_capabilities(&adapter);
    let surface_format = capabilities
        .formats
        .iter()
        .copied()
        .find(|f| f.is_srgb())
        .unwrap_or(capabilities.formats[0]);
    let size = window.inner_size();
    let mut config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: surface_format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode: wgpu::PresentMode::AutoVsync,
        alpha_mode: capabilities.alpha_modes[0],
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&device, &config);

    let mut renderer = Renderer::new(device, queue, surface_format, config.width, config.height);
    session.camera.set_aspect(config.width, config.height);

    let mut last_frame = Instant::now();

    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, window_id } if window_id == window.id() => match event {
            WindowEvent::CloseRequested => {
                // Persist settings so the next launch resumes where this one
                // left off.
                if let Err(e) = SettingsStore::default_location().save(&session.capture()) {
                    log::warn!("failed to persist settings: {}", e);
                }
                elwt.exit();
            }
            WindowEvent::Resized(new_size) => {
                config.width = new_size.width.max(1);
                config.height = new_size.height.max(1);
                surface.configure(renderer.device(), &config);
                renderer.resize(config.width, config.height);
                session.camera.set_aspect(config.width, config.height);
            }
            WindowEvent::KeyboardInput {
                event: KeyEvent { physical_key: PhysicalKey::Code(code), state, .. },
                ..
            } => {
                if code == KeyCode::Escape && state == ElementState::Pressed {
                    if let Err(e) = SettingsStore::default_location().save(&session.capture()) {
                        log::warn!("failed to persist settings: {}", e);
                    }
                    elwt.exit();
                } else {
                    input.on_key(code, state);
                }
            }
            WindowEvent::MouseInput { button, state, .. } => {
                input.on_mouse_button(button, state);
            }
            WindowEvent::CursorMoved { position, .. } => {
                input.on_cursor_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                input.on_scroll(delta);
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let dt = (now - last_frame).as_secs_f32().min(0.1);
                last_frame = now;

                session.tick(dt, &mut input);

                match surface.get_current_texture() {
                    Ok(frame) => {
                        let view = frame
                            .texture
                            .create_view(&wgpu::TextureViewDescriptor::default());
                        renderer.render(&mut session, &view);
                        frame.present();
                    }
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        surface.configure(renderer.device(), &config);
                    }
                    Err(e) => log::error!("surface error: {}", e),
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            window.request_redraw();
        }
        _ => {}
    })?;

    Ok(())
}

// ============================================================================
// snapshot
// ============================================================================

async fn render_snapshot(
    models: Vec<PathBuf>,
    out: PathBuf,
    hdr: Option<PathBuf>,
    settings: Option<PathBuf>,
    width: u32,
    height: u32,
) -> Result<()> {
    let expected = models.len() + hdr.is_some() as usize;
    let mut session = prepare_session(models, hdr, settings, false)?;
    drain_loads(&mut session, expected);
    if session.models.is_empty() {
        return Err(anyhow!("no models loaded"));
    }
    session.camera.set_aspect(width, height);

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| anyhow!("No compatible graphics adapter found"))?;
    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor::default(), None)
        .await?;

    let texture_desc = wgpu::TextureDescriptor {
        label: Some("Snapshot Target"),
        size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    };

    let mut renderer = Renderer::new(device, queue, texture_desc.format, width, height);
    let texture = renderer.device().create_texture(&texture_desc);
    let texture_view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    // Readback rows must be 256-byte aligned.
    let unpadded_bytes_per_row = 4 * width;
    let align = 256;
    let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;
    let output_buffer = renderer.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some("Snapshot Readback Buffer"),
        size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut input = InputState::new();
    // Two ticks: the first uploads assets and rebuilds the shadow map via
    // render, the second renders with everything settled.
    session.tick(0.0, &mut input);
    renderer.render(&mut session, &texture_view);
    renderer.render(&mut session, &texture_view);

    let mut encoder = renderer
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &output_buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        texture_desc.size,
    );
    renderer.queue().submit(Some(encoder.finish()));

    let buffer_slice = output_buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
        let _ = tx.send(v);
    });
    renderer.device().poll(wgpu::Maintain::Wait);
    rx.recv()
        .context("readback channel closed")?
        .map_err(|e| anyhow!("buffer map failed: {:?}", e))?;

    let data = buffer_slice.get_mapped_range();
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    for row in 0..height {
        let start = (row * padded_bytes_per_row) as usize;
        pixels.extend_from_slice(&data[start..start + (width * 4) as usize]);
    }
    drop(data);
    output_buffer.unmap();

    image::save_buffer(&out, &pixels, width, height, image::ColorType::Rgba8)?;
    println!("Wrote {}", out.display());
    Ok(())
}

// ============================================================================
// inspect
// ============================================================================

fn run_inspect(paths: Vec<PathBuf>) -> Result<()> {
    let mut models = Vec::new();
    for path in &paths {
        let loaded = model::load_obj(path).map_err(|e| anyhow!("{}", e))?;
        models.push(loaded);
    }
    let scenes: Vec<_> = models.iter().map(|m| m.scene.clone()).collect();

    let stats = crate::stats::SceneStats::collect(&scenes);
    println!("Nodes:     {}", stats.node_count);
    println!("Meshes:    {}", stats.mesh_count);
    println!("Triangles: {}", stats.triangle_count);
    println!("Materials: {}", stats.material_count);
    println!("Textures:  {} ({:.2} MB)", stats.texture_count, stats.texture_mb);

    let tree = SceneTree::build(&scenes);
    println!("\nScene tree:");
    for row in tree.visible_rows() {
        let marker = if row.has_children {
            if row.expanded { "- " } else { "+ " }
        } else {
            "  "
        };
        println!("{}{}{}", "  ".repeat(row.depth), marker, row.label);
    }

    for scene in &scenes {
        let entries = inspector::material_list(scene);
        if entries.is_empty() {
            continue;
        }
        println!("\nMaterials in {}:", scene.name);
        for entry in entries {
            println!("  [{}] {} ({:.2} MB textures)", entry.material, entry.name, entry.texture_mb);
            if let Some(material) = scene.materials.get(entry.material) {
                for row in inspector::material_rows(material) {
                    println!("      {}: {}", row.label, row.value);
                }
            }
        }
    }
    Ok(())
}
