mod captions;
mod shapes;
mod slides;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use captions::CaptionRenderer;
use shapes::ShapeRenderer;
use slides::SlideRenderer;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wgpu::SurfaceError;
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalSize},
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

use crate::config::{Configuration, Theme, ViewportSize, Wraparound};
use crate::events::{CarouselCommand, CarouselSnapshot, ImageOutcome, SlideImage};
use crate::keyboard::{KeyResponse, KeyboardSlot, nav_key};
use crate::layout::{self, Control, ControlVisibility, LayoutInput, Scene};
use crate::transition::StripAnimator;

const WINDOW_TITLE: &str = "Carousel";

#[derive(Debug)]
enum ViewerEvent {
    Cancelled,
    SnapshotChanged,
    ImageReady(SlideImage),
}

/// Channels connecting the viewer to the rest of the pipeline.
pub struct ViewerChannels {
    pub snapshots: watch::Receiver<CarouselSnapshot>,
    pub images: mpsc::Receiver<SlideImage>,
    pub commands: mpsc::Sender<CarouselCommand>,
    /// Physical slide size the loader should decode to.
    pub decode_size: watch::Sender<(u32, u32)>,
}

struct GpuState {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    device: wgpu::Device,
    queue: wgpu::Queue,
    slides: SlideRenderer,
    shapes: ShapeRenderer,
    captions: CaptionRenderer,
}

impl GpuState {
    fn new(window: Arc<Window>) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to acquire GPU adapter")?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|fmt| fmt.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no texture formats")?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("carousel-device"),
            required_limits: adapter.limits(),
            ..Default::default()
        }))
        .context("failed to acquire GPU device")?;

        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        info!(
            width = config.width,
            height = config.height,
            format = ?config.format,
            "viewer surface configured",
        );

        let slides = SlideRenderer::new(&device, &queue, format);
        let shapes = ShapeRenderer::new(&device, format);
        let captions = CaptionRenderer::new(&device, &queue, format);

        Ok(Self {
            surface,
            config,
            device,
            queue,
            slides,
            shapes,
            captions,
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.config.width = size.width.max(1);
        self.config.height = size.height.max(1);
        self.surface.configure(&self.device, &self.config);
        debug!(
            width = self.config.width,
            height = self.config.height,
            "viewer surface resized",
        );
    }

    fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.config.width, self.config.height)
    }

    fn upload(&mut self, image: &SlideImage) {
        if let ImageOutcome::Loaded(prepared) = &image.outcome {
            self.slides
                .insert(&self.device, &self.queue, &image.reference, prepared);
        }
    }

    fn render(
        &mut self,
        scene: &Scene,
        snapshot: &CarouselSnapshot,
        theme: &Theme,
        logical: (f32, f32),
        scale: f32,
    ) -> Result<(), SurfaceError> {
        let (width, height) = logical;
        let mut quads: Vec<(&str, [f32; 4])> = Vec::new();
        if let Scene::Strip(strip) = scene {
            for placement in &strip.slides {
                let Some(slide) = snapshot.deck.get(placement.index) else {
                    continue;
                };
                let b = placement.bounds;
                quads.push((
                    slide.image.as_str(),
                    [
                        (b.x / width) * 2.0 - 1.0,
                        1.0 - (b.y / height) * 2.0,
                        (b.right() / width) * 2.0 - 1.0,
                        1.0 - (b.bottom() / height) * 2.0,
                    ],
                ));
            }
        }
        self.slides.prepare(&self.device, &self.queue, &quads);

        let geometry = shapes::build_geometry(scene, &snapshot.deck, theme, logical);
        self.shapes.update(&self.device, &geometry);

        let size = self.size();
        self.captions.prepare(
            &self.device,
            &self.queue,
            scene,
            &snapshot.deck,
            snapshot.deck_revision,
            theme,
            size,
            scale,
        );

        let frame = self.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("carousel-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("carousel-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(to_wgpu_color(theme)),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
                multiview_mask: None,
            });
            self.slides.draw(&mut pass);
            self.shapes.draw(&mut pass);
            self.captions.draw(&mut pass);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        self.captions.trim();
        Ok(())
    }
}

fn to_wgpu_color(theme: &Theme) -> wgpu::Color {
    let color = theme.background;
    wgpu::Color {
        r: color.red as f64,
        g: color.green as f64,
        b: color.blue as f64,
        a: color.alpha as f64,
    }
}

struct ViewerApp {
    cancel: CancellationToken,
    viewport: ViewportSize,
    visibility: ControlVisibility,
    theme: Theme,
    wraparound: Wraparound,
    snapshots: watch::Receiver<CarouselSnapshot>,
    snapshot: CarouselSnapshot,
    commands: mpsc::Sender<CarouselCommand>,
    decode_size: watch::Sender<(u32, u32)>,
    keyboard: KeyboardSlot,
    animator: StripAnimator,
    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,
    /// Images that arrived before the GPU was ready.
    pending_images: Vec<SlideImage>,
    cursor: Option<(f32, f32)>,
    pending_redraw: bool,
}

impl ViewerApp {
    fn new(
        cfg: &Configuration,
        theme: Theme,
        snapshots: watch::Receiver<CarouselSnapshot>,
        commands: mpsc::Sender<CarouselCommand>,
        decode_size: watch::Sender<(u32, u32)>,
        cancel: CancellationToken,
    ) -> Self {
        let snapshot = snapshots.borrow().clone();
        let animator = StripAnimator::new(
            snapshot.current_index.unwrap_or(0),
            cfg.carousel.transition_duration(),
            Instant::now(),
        );
        Self {
            cancel,
            viewport: cfg.viewport,
            visibility: ControlVisibility::from(&cfg.carousel),
            theme,
            wraparound: cfg.carousel.wraparound,
            snapshots,
            snapshot,
            commands,
            decode_size,
            keyboard: KeyboardSlot::default(),
            animator,
            window: None,
            gpu: None,
            pending_images: Vec::new(),
            cursor: None,
            pending_redraw: false,
        }
    }

    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Option<Arc<Window>> {
        if let Some(window) = self.window.as_ref() {
            return Some(window.clone());
        }

        let (width, height) = layout::window_size(self.viewport, self.visibility);
        let attrs = WindowAttributes::default()
            .with_title(self.title())
            .with_inner_size(LogicalSize::new(width as f64, height as f64));
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                self.window = Some(window.clone());
                Some(window)
            }
            Err(err) => {
                error!(error = %err, "failed to create viewer window");
                None
            }
        }
    }

    fn title(&self) -> String {
        match self.snapshot.current_slide() {
            Some(slide) if !slide.title.is_empty() => format!("{} - {WINDOW_TITLE}", slide.title),
            _ => WINDOW_TITLE.to_string(),
        }
    }

    fn scale(&self) -> f32 {
        self.window
            .as_ref()
            .map_or(1.0, |window| window.scale_factor() as f32)
    }

    fn publish_decode_size(&self) {
        let size = physical_slide_size(self.viewport, self.scale());
        let changed = self.decode_size.send_if_modified(|current| {
            if *current == size {
                return false;
            }
            *current = size;
            true
        });
        if changed {
            debug!(width = size.0, height = size.1, "slide decode size updated");
        }
    }

    fn logical_size(&self) -> (f32, f32) {
        match (self.window.as_ref(), self.gpu.as_ref()) {
            (Some(_), Some(gpu)) => {
                let scale = self.scale();
                let size = gpu.size();
                (size.width as f32 / scale, size.height as f32 / scale)
            }
            _ => layout::window_size(self.viewport, self.visibility),
        }
    }

    fn scene(&self, now: Instant) -> Scene {
        layout::compose(&LayoutInput {
            window: self.logical_size(),
            visibility: self.visibility,
            deck_len: self.snapshot.deck.len(),
            current_index: self.snapshot.current_index,
            is_playing: self.snapshot.is_playing,
            strip_position: self.animator.position(now),
        })
    }

    fn apply_snapshot(&mut self) {
        let next = self.snapshots.borrow_and_update().clone();
        if next.revision == self.snapshot.revision {
            return;
        }
        let now = Instant::now();
        if next.deck_revision != self.snapshot.deck_revision {
            self.animator.jump_to(next.current_index.unwrap_or(0));
        } else if next.last_change != self.snapshot.last_change {
            if let Some(last) = next.last_change {
                self.animator
                    .animate_to(last.change, next.deck.len(), self.wraparound, now);
            }
        }
        if next.interval != self.snapshot.interval {
            debug!(interval = ?next.interval, "autoplay interval changed");
        }
        self.snapshot = next;
        if let Some(window) = self.window.as_ref() {
            window.set_title(&self.title());
        }
        self.request_redraw();
    }

    fn on_image(&mut self, image: SlideImage) {
        match self.gpu.as_mut() {
            Some(gpu) => {
                gpu.upload(&image);
                self.request_redraw();
            }
            None => self.pending_images.push(image),
        }
    }

    fn on_click(&mut self) {
        let Some((x, y)) = self.cursor else {
            return;
        };
        let scene = self.scene(Instant::now());
        let Some(control) = layout::hit_test(&scene, x, y) else {
            return;
        };
        self.activate(control);
    }

    fn activate(&self, control: Control) {
        info!(control = %control.label(), "control activated");
        let command = control.command();
        if let Err(err) = self.commands.try_send(command) {
            warn!("failed to forward control command: {err}");
        }
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.resize(new_size);
        }
        self.request_redraw();
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let scene = self.scene(now);
        let logical = self.logical_size();
        let scale = self.scale();
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };

        self.pending_redraw = self.animator.is_animating(now);
        match gpu.render(&scene, &self.snapshot, &self.theme, logical, scale) {
            Ok(()) => {}
            Err(SurfaceError::Outdated) | Err(SurfaceError::Lost) => {
                info!("viewer surface lost; reconfiguring");
                let size = gpu.size();
                self.handle_resize(size);
            }
            Err(SurfaceError::OutOfMemory) => {
                error!("viewer surface out of memory; exiting event loop");
                event_loop.exit();
            }
            Err(SurfaceError::Timeout) => {
                warn!("viewer surface acquisition timed out");
                self.pending_redraw = true;
            }
            Err(SurfaceError::Other) => {
                warn!("viewer surface reported an unknown error; retrying");
                let size = gpu.size();
                self.handle_resize(size);
            }
        }
    }

    fn request_redraw(&mut self) {
        self.pending_redraw = true;
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

impl ApplicationHandler<ViewerEvent> for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }

        let Some(window) = self.ensure_window(event_loop) else {
            event_loop.exit();
            return;
        };

        if self.gpu.is_none() {
            match GpuState::new(window) {
                Ok(mut gpu) => {
                    for image in self.pending_images.drain(..) {
                        gpu.upload(&image);
                    }
                    self.gpu = Some(gpu);
                }
                Err(err) => {
                    error!(error = ?err, "failed to initialize GPU state");
                    event_loop.exit();
                    return;
                }
            }
        }

        self.publish_decode_size();
        self.keyboard.mount(self.commands.clone());
        self.request_redraw();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("viewer window close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                self.handle_resize(new_size);
            }
            WindowEvent::ScaleFactorChanged {
                mut inner_size_writer,
                ..
            } => {
                let size = window.inner_size();
                let _ = inner_size_writer.request_inner_size(size);
                self.handle_resize(size);
                self.publish_decode_size();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed {
                    return;
                }
                if let KeyResponse::Handled { suppress_default } =
                    self.keyboard.handle(nav_key(&event.logical_key))
                {
                    debug!(key = ?event.logical_key, suppress_default, "key handled");
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let scale = window.scale_factor();
                self.cursor = Some(((position.x / scale) as f32, (position.y / scale) as f32));
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                self.on_click();
            }
            WindowEvent::RedrawRequested => {
                self.draw(event_loop);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.pending_redraw {
            if let Some(window) = self.window.as_ref() {
                window.request_redraw();
            }
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Cancelled => {
                info!("viewer received cancellation event");
                event_loop.exit();
            }
            ViewerEvent::SnapshotChanged => self.apply_snapshot(),
            ViewerEvent::ImageReady(image) => self.on_image(image),
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.keyboard.dispose();
    }
}

/// Size in physical pixels that one slide covers at `scale`.
fn physical_slide_size(viewport: ViewportSize, scale: f32) -> (u32, u32) {
    let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
    (
        (viewport.width as f32 * scale).round().max(1.0) as u32,
        (viewport.height as f32 * scale).round().max(1.0) as u32,
    )
}

/// Opens the carousel window and runs the event loop on the calling thread
/// until the window closes or `cancel` fires. Must be called from within a
/// tokio runtime; the channel bridges run as tasks on it.
pub fn run_windowed(cfg: &Configuration, channels: ViewerChannels, cancel: CancellationToken) -> Result<()> {
    let theme = cfg.theme.resolve().context("invalid theme")?;
    let event_loop = EventLoop::<ViewerEvent>::with_user_event()
        .build()
        .context("failed to build viewer event loop")?;

    let cancel_task = {
        let cancel = cancel.clone();
        let proxy = event_loop.create_proxy();
        tokio::spawn(async move {
            cancel.cancelled().await;
            let _ = proxy.send_event(ViewerEvent::Cancelled);
        })
    };

    let snapshot_task = {
        let mut snapshots = channels.snapshots.clone();
        let proxy = event_loop.create_proxy();
        tokio::spawn(async move {
            while snapshots.changed().await.is_ok() {
                if proxy.send_event(ViewerEvent::SnapshotChanged).is_err() {
                    break;
                }
            }
        })
    };

    let ViewerChannels {
        snapshots,
        mut images,
        commands,
        decode_size,
    } = channels;

    let image_task = {
        let proxy = event_loop.create_proxy();
        tokio::spawn(async move {
            while let Some(image) = images.recv().await {
                if proxy.send_event(ViewerEvent::ImageReady(image)).is_err() {
                    break;
                }
            }
        })
    };

    let mut app = ViewerApp::new(cfg, theme, snapshots, commands, decode_size, cancel);
    let run_result = event_loop.run_app(&mut app);
    cancel_task.abort();
    snapshot_task.abort();
    image_task.abort();

    run_result.context("viewer event loop failed")
}
