//! Canvas-based workflow graph editor.
//!
//! Talks to a workflow backend over HTTP (`--api-url`, default the dev
//! server), renders the graph on an iced canvas, and drives an
//! [`EditorSession`] for every interaction: palette drops, node drags,
//! port-to-port connections, the inline properties panel, and the modal
//! configuration dialog.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use iced::widget::{
    button, canvas, column, container, pick_list, row, scrollable, text, text_input, Canvas,
};
use iced::{
    alignment, executor, mouse, Application, Color, Command, Element, Length, Point, Rectangle,
    Renderer, Settings, Subscription, Theme, Vector,
};
use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flowdeck::{
    ConfigForm, EditorSession, EntityId, FieldKind, HttpBackend, HttpBackendConfig, Node,
    NodeKind, NullSurface,
};

const NODE_WIDTH: f32 = 160.0;
const NODE_HEIGHT: f32 = 72.0;
const PORT_RADIUS: f32 = 6.0;
const GRID: f32 = 20.0;
const DOUBLE_CLICK_MS: u128 = 350;

#[derive(Debug, Clone, Parser)]
#[command(name = "graph_editor", about = "Workflow graph editor")]
struct Args {
    /// Workflow to open.
    #[arg(long)]
    workflow: String,

    /// Base URL of the workflow backend.
    #[arg(long, default_value = "http://127.0.0.1:3001/api")]
    api_url: String,
}

fn main() -> iced::Result {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if !prepare_display_env() {
        return Ok(());
    }

    let args = Args::parse();
    GraphEditor::run(Settings {
        antialiasing: true,
        ..Settings::with_flags(args)
    })
}

/// Pick a usable windowing backend before winit does, so a headless or
/// half-configured host fails with advice instead of a panic.
fn prepare_display_env() -> bool {
    let wayland = std::env::var("WAYLAND_DISPLAY").ok();
    let x11 = std::env::var("DISPLAY").ok();
    let hint = std::env::var("FLOWDECK_BACKEND").ok();

    if wayland.is_none() && x11.is_none() {
        eprintln!(
            "No display found (neither DISPLAY nor WAYLAND_DISPLAY set). \
             Start an X11/Wayland session or run under Xvfb, e.g. \
             `Xvfb :99 -screen 0 1280x720x24 & DISPLAY=:99 cargo run --features gui --bin graph_editor`."
        );
        return false;
    }

    // Both set and no hint: prefer X11, which survives more setups.
    if wayland.is_some() && x11.is_some() && hint.as_deref() != Some("wayland") {
        std::env::remove_var("WAYLAND_DISPLAY");
    }

    if std::env::var("WAYLAND_DISPLAY").is_ok() && !has_client_lib(&["libwayland-client.so.0", "libwayland-client.so"]) {
        eprintln!("Wayland libraries are missing (libwayland-client). Install them or set FLOWDECK_BACKEND=x11.");
        return false;
    }
    if std::env::var("WAYLAND_DISPLAY").is_err() && !has_client_lib(&["libX11.so.6", "libX11.so"]) {
        eprintln!("X11 libraries are missing (libX11). Install them or use a Wayland session.");
        return false;
    }
    true
}

fn has_client_lib(names: &[&str]) -> bool {
    #[cfg(target_os = "linux")]
    {
        names
            .iter()
            .any(|lib| unsafe { libloading::Library::new(lib) }.is_ok())
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = names;
        true
    }
}

#[derive(Clone)]
struct SessionHandle(Arc<Mutex<EditorSession>>);

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionHandle")
    }
}

/// Everything the canvas needs per frame, cloned out of the session so
/// rendering never holds the lock.
#[derive(Debug, Clone, Default)]
struct GraphSnapshot {
    nodes: Vec<Node>,
    edges: Vec<(EntityId, EntityId)>,
    zoom: f32,
    selected: Option<EntityId>,
}

#[derive(Debug, Clone)]
struct GuiDrag {
    node: EntityId,
    grab_x: f32,
    grab_y: f32,
    position: Point,
}

#[derive(Debug, Clone)]
struct InspectorState {
    node: EntityId,
    name: String,
    description: String,
    form: Option<ConfigForm>,
}

#[derive(Debug, Clone)]
struct ModalState {
    node: EntityId,
    title: String,
    form: ConfigForm,
}

#[derive(Debug)]
struct GraphEditor {
    session: Option<SessionHandle>,
    snapshot: GraphSnapshot,
    status: String,
    inspector: Option<InspectorState>,
    modal: Option<ModalState>,
    pending_connect: Option<EntityId>,
    drag: Option<GuiDrag>,
    last_click: Option<(EntityId, Instant)>,
    export_path: String,
}

#[derive(Debug, Clone)]
enum Message {
    Initialized(Result<SessionHandle, String>),
    Refresh,
    AddNode(NodeKind),
    CanvasPressed(Point),
    CanvasMoved(Point),
    CanvasReleased(Point),
    InspectorName(String),
    InspectorDescription(String),
    InspectorField(&'static str, String),
    SaveProperties,
    OpenModal,
    ModalField(&'static str, String),
    ModalSave,
    ModalCancel,
    DeleteSelected,
    ClearCanvas,
    ZoomIn,
    ZoomOut,
    ResetZoom,
    SaveWorkflow,
    Execute,
    ExportPathChanged(String),
    ExportDocument,
    ImportDocument,
    OpFinished(Result<String, String>),
}

impl Application for GraphEditor {
    type Executor = executor::Default;
    type Theme = Theme;
    type Flags = Args;
    type Message = Message;

    fn new(args: Args) -> (Self, Command<Message>) {
        let editor = GraphEditor {
            session: None,
            snapshot: GraphSnapshot::default(),
            status: "Connecting...".to_string(),
            inspector: None,
            modal: None,
            pending_connect: None,
            drag: None,
            last_click: None,
            export_path: "workflow.yaml".to_string(),
        };
        (
            editor,
            Command::perform(initialize(args), Message::Initialized),
        )
    }

    fn title(&self) -> String {
        match self
            .session
            .as_ref()
            .and_then(|s| s.0.try_lock().ok().and_then(|s| s.workflow().cloned()))
        {
            Some(workflow) => format!("flowdeck editor - {}", workflow.name),
            None => "flowdeck editor".to_string(),
        }
    }

    fn subscription(&self) -> Subscription<Message> {
        Subscription::none()
    }

    fn update(&mut self, message: Message) -> Command<Message> {
        match message {
            Message::Initialized(Ok(handle)) => {
                self.session = Some(handle);
                self.status = "Workflow loaded".to_string();
                self.refresh();
            }
            Message::Initialized(Err(error)) => {
                self.status = format!("Failed to open workflow: {error}");
            }
            Message::Refresh => self.refresh(),
            Message::AddNode(kind) => {
                self.with_session(|editor, session| {
                    // Palette clicks land the node mid-canvas.
                    let node = session.drop_from_palette(kind, 360.0, 200.0);
                    editor.status = format!("Added {}", node.name);
                });
                self.refresh();
            }
            Message::CanvasPressed(position) => {
                self.canvas_pressed(position);
                self.refresh();
            }
            Message::CanvasMoved(position) => {
                if let Some(drag) = &mut self.drag {
                    drag.position = position;
                }
            }
            Message::CanvasReleased(position) => {
                if self.drag.take().is_some() {
                    self.with_session(|_, session| {
                        session.end_drag(position.x, position.y);
                    });
                }
                self.refresh();
            }
            Message::InspectorName(name) => {
                if let Some(inspector) = &mut self.inspector {
                    inspector.name = name;
                }
            }
            Message::InspectorDescription(description) => {
                if let Some(inspector) = &mut self.inspector {
                    inspector.description = description;
                }
            }
            Message::InspectorField(field, value) => {
                if let Some(form) = self.inspector.as_mut().and_then(|i| i.form.as_mut()) {
                    form.set(field, value);
                }
            }
            Message::SaveProperties => {
                self.save_properties();
                self.refresh();
            }
            Message::OpenModal => self.open_modal(),
            Message::ModalField(field, value) => {
                if let Some(modal) = &mut self.modal {
                    modal.form.set(field, value);
                }
            }
            Message::ModalSave => {
                self.save_modal();
                self.refresh();
            }
            Message::ModalCancel => self.modal = None,
            Message::DeleteSelected => {
                if let Some(handle) = self.session.clone() {
                    let selected = self.snapshot.selected.clone();
                    if let Some(id) = selected {
                        self.inspector = None;
                        return Command::perform(
                            async move {
                                let mut session = handle.0.lock().await;
                                session
                                    .delete_node(&id)
                                    .await
                                    .map(|_| "Node deleted".to_string())
                                    .map_err(|e| e.to_string())
                            },
                            Message::OpFinished,
                        );
                    }
                    self.status = "Select a node first".to_string();
                }
            }
            Message::ClearCanvas => {
                if let Some(handle) = self.session.clone() {
                    self.inspector = None;
                    return Command::perform(
                        async move {
                            let mut session = handle.0.lock().await;
                            session
                                .clear_canvas()
                                .await
                                .map(|_| "Canvas cleared".to_string())
                                .map_err(|e| e.to_string())
                        },
                        Message::OpFinished,
                    );
                }
            }
            Message::ZoomIn => {
                self.with_session(|_, session| {
                    session.zoom_in();
                });
                self.refresh();
            }
            Message::ZoomOut => {
                self.with_session(|_, session| {
                    session.zoom_out();
                });
                self.refresh();
            }
            Message::ResetZoom => {
                self.with_session(|_, session| {
                    session.reset_zoom();
                });
                self.refresh();
            }
            Message::SaveWorkflow => {
                if let Some(handle) = self.session.clone() {
                    return Command::perform(
                        async move {
                            let mut session = handle.0.lock().await;
                            session
                                .save_workflow()
                                .await
                                .map(|w| format!("Workflow \"{}\" saved", w.name))
                                .map_err(|e| e.to_string())
                        },
                        Message::OpFinished,
                    );
                }
            }
            Message::Execute => {
                if let Some(handle) = self.session.clone() {
                    return Command::perform(
                        async move {
                            let mut session = handle.0.lock().await;
                            session
                                .execute()
                                .await
                                .map(|handle| format!("Execution started: {}", handle.id))
                                .map_err(|e| e.to_string())
                        },
                        Message::OpFinished,
                    );
                }
            }
            Message::ExportPathChanged(path) => self.export_path = path,
            Message::ExportDocument => {
                self.export_document();
            }
            Message::ImportDocument => {
                self.import_document();
                self.refresh();
            }
            Message::OpFinished(Ok(status)) => {
                self.status = status;
                self.refresh();
            }
            Message::OpFinished(Err(error)) => {
                self.status = error;
                self.refresh();
            }
        }
        Command::none()
    }

    fn view(&self) -> Element<'_, Message> {
        if let Some(modal) = &self.modal {
            return self.modal_view(modal);
        }

        let palette = NodeKind::ALL.iter().fold(
            column![text("Add node").size(20)].spacing(6),
            |col, kind| col.push(button(kind.label()).on_press(Message::AddNode(*kind))),
        );

        let file_controls = column![
            text("Document").size(20),
            text_input("path", &self.export_path).on_input(Message::ExportPathChanged),
            row![
                button("Export").on_press(Message::ExportDocument),
                button("Import").on_press(Message::ImportDocument)
            ]
            .spacing(8),
        ]
        .spacing(8);

        let left_panel =
            scrollable(column![palette, file_controls].spacing(16)).width(Length::Fixed(190.0));

        let toolbar = row![
            button("Save workflow").on_press(Message::SaveWorkflow),
            button("Execute").on_press(Message::Execute),
            button("Zoom +").on_press(Message::ZoomIn),
            button("Zoom -").on_press(Message::ZoomOut),
            button("Zoom 1:1").on_press(Message::ResetZoom),
            button("Clear canvas").on_press(Message::ClearCanvas),
        ]
        .spacing(8);

        let canvas_view: Element<Message> = Canvas::new(GraphView {
            snapshot: &self.snapshot,
            drag: self.drag.as_ref(),
            pending_connect: self.pending_connect.as_ref(),
        })
        .width(Length::FillPortion(3))
        .height(Length::Fill)
        .into();

        let right_panel = scrollable(self.inspector_view()).width(Length::Fixed(320.0));

        let content = row![left_panel, canvas_view, right_panel].spacing(8);

        container(column![toolbar, content, text(&self.status)].spacing(8))
            .padding(8)
            .into()
    }
}

async fn initialize(args: Args) -> Result<SessionHandle, String> {
    let backend =
        HttpBackend::from_config(HttpBackendConfig::new(args.api_url)).map_err(|e| e.to_string())?;
    let mut session = EditorSession::new(args.workflow, Arc::new(backend), Box::new(NullSurface));
    session.load().await.map_err(|e| e.to_string())?;
    Ok(SessionHandle(Arc::new(Mutex::new(session))))
}

impl GraphEditor {
    /// Run a synchronous session operation from the UI thread. The lock
    /// is only ever contended while an async op is in flight.
    fn with_session(&mut self, f: impl FnOnce(&mut GraphEditor, &mut EditorSession)) {
        let Some(handle) = self.session.clone() else {
            self.status = "Not connected".to_string();
            return;
        };
        match handle.0.try_lock() {
            Ok(mut session) => f(self, &mut session),
            Err(_) => self.status = "Busy...".to_string(),
        }
    }

    fn refresh(&mut self) {
        let Some(handle) = self.session.clone() else {
            return;
        };
        let Ok(mut session) = handle.0.try_lock() else {
            return;
        };
        for notice in session.poll_events() {
            self.status = notice.to_string();
        }
        self.snapshot = GraphSnapshot {
            nodes: session.with_model(|m| m.nodes().cloned().collect()),
            edges: session.with_model(|m| {
                m.edges()
                    .iter()
                    .map(|e| (e.source.clone(), e.target.clone()))
                    .collect()
            }),
            zoom: session.viewport().zoom(),
            selected: session.selection().cloned(),
        };
        self.sync_inspector(&session);
    }

    fn sync_inspector(&mut self, session: &EditorSession) {
        let selected = session.selected_node();
        match (&self.inspector, &selected) {
            (Some(inspector), Some(node)) if inspector.node == node.id => {}
            (_, Some(node)) => {
                self.inspector = Some(InspectorState {
                    node: node.id.clone(),
                    name: node.name.clone(),
                    description: node.description.clone(),
                    form: ConfigForm::for_node(node),
                });
            }
            (_, None) => self.inspector = None,
        }
    }

    fn canvas_pressed(&mut self, position: Point) {
        let zoom = if self.snapshot.zoom > 0.0 {
            self.snapshot.zoom
        } else {
            1.0
        };
        let canvas_point = Point::new(position.x / zoom, position.y / zoom);

        // Output-port click starts a connection; a later click on another
        // node (or its input port) completes it.
        if let Some(node) = hit_output_port(&self.snapshot, canvas_point) {
            self.pending_connect = Some(node);
            self.status = "Pick a target node to connect".to_string();
            return;
        }

        match hit_node(&self.snapshot, canvas_point) {
            Some((id, offset)) => {
                if let Some(source) = self.pending_connect.take() {
                    if source != id {
                        self.with_session(|editor, session| {
                            match session.connect(&source, &id) {
                                Ok(_) => editor.status = "Edge added".to_string(),
                                Err(error) => editor.status = error.to_string(),
                            }
                        });
                        return;
                    }
                }

                let now = Instant::now();
                let double = matches!(
                    &self.last_click,
                    Some((last, at)) if *last == id && now.duration_since(*at).as_millis() < DOUBLE_CLICK_MS
                );
                self.last_click = Some((id.clone(), now));

                self.with_session(|_, session| {
                    session.begin_drag(&id, position.x, position.y);
                });
                self.drag = Some(GuiDrag {
                    node: id.clone(),
                    grab_x: offset.x,
                    grab_y: offset.y,
                    position,
                });

                if double {
                    self.drag = None;
                    self.with_session(|_, session| session.cancel_drag());
                    self.open_modal_for(id);
                }
            }
            None => {
                self.pending_connect = None;
                self.with_session(|_, session| session.clear_selection());
                self.inspector = None;
            }
        }
    }

    fn save_properties(&mut self) {
        let Some(inspector) = self.inspector.clone() else {
            self.status = "Select a node first".to_string();
            return;
        };
        if let Some(form) = &inspector.form {
            let issues = form.validate();
            if !issues.is_empty() {
                self.status = issues
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                return;
            }
        }
        self.with_session(|editor, session| {
            let result = session
                .update_node_meta(&inspector.node, &inspector.name, &inspector.description)
                .and_then(|_| match &inspector.form {
                    Some(form) => session.update_node_config(&inspector.node, form.values()),
                    None => Ok(()),
                });
            editor.status = match result {
                Ok(()) => "Node properties saved".to_string(),
                Err(error) => error.to_string(),
            };
        });
    }

    fn open_modal(&mut self) {
        let Some(inspector) = &self.inspector else {
            self.status = "Select a node first".to_string();
            return;
        };
        let node = inspector.node.clone();
        self.open_modal_for(node);
    }

    fn open_modal_for(&mut self, node: EntityId) {
        let mut opened = None;
        self.with_session(|_, session| {
            if let Some(node) = session.select(&node) {
                opened = ConfigForm::for_node(&node).map(|form| ModalState {
                    node: node.id.clone(),
                    title: format!("Configure {}", node.name),
                    form,
                });
            }
        });
        match opened {
            Some(modal) => self.modal = Some(modal),
            // Kinds with no fields short-circuit with a notice.
            None => self.status = "This node type has nothing to configure".to_string(),
        }
    }

    fn save_modal(&mut self) {
        let Some(modal) = self.modal.take() else {
            return;
        };
        self.with_session(|editor, session| {
            editor.status = match session.update_node_config(&modal.node, modal.form.values()) {
                Ok(()) => "Node configuration saved".to_string(),
                Err(error) => error.to_string(),
            };
        });
    }

    fn export_document(&mut self) {
        let mut exported = None;
        self.with_session(|_, session| {
            exported = Some(session.export_document());
        });
        let Some(document) = exported else { return };
        match document
            .to_yaml_string()
            .map_err(|e| e.to_string())
            .and_then(|yaml| std::fs::write(&self.export_path, yaml).map_err(|e| e.to_string()))
        {
            Ok(()) => self.status = format!("Exported to {}", self.export_path),
            Err(error) => self.status = format!("Export failed: {error}"),
        }
    }

    fn import_document(&mut self) {
        let content = match std::fs::read_to_string(&self.export_path) {
            Ok(content) => content,
            Err(error) => {
                self.status = format!("Read error: {error}");
                return;
            }
        };
        let document = match flowdeck::GraphDocument::from_yaml_str(&content) {
            Ok(document) => document,
            Err(error) => {
                self.status = format!("Parse error: {error}");
                return;
            }
        };
        self.with_session(|editor, session| {
            editor.status = match session.import_document(&document) {
                Ok(()) => format!("Imported {}", editor.export_path),
                Err(error) => format!("Import failed: {error}"),
            };
        });
    }

    fn inspector_view(&self) -> Element<'_, Message> {
        let Some(inspector) = &self.inspector else {
            return container(
                text("Select a node to edit").horizontal_alignment(alignment::Horizontal::Center),
            )
            .padding(16)
            .into();
        };

        let mut view = column![
            text(format!("Editing {}", inspector.node)).size(20),
            text_input("name", &inspector.name).on_input(Message::InspectorName),
            text_input("description", &inspector.description)
                .on_input(Message::InspectorDescription),
        ]
        .spacing(8);

        if let Some(form) = &inspector.form {
            view = view.push(text("Configuration").size(16));
            for control in form.controls() {
                view = view.push(field_control(control.field.name, control, Message::InspectorField));
            }
        }

        view = view.push(
            row![
                button("Save").on_press(Message::SaveProperties),
                button("Configure...").on_press(Message::OpenModal),
                button("Delete").on_press(Message::DeleteSelected)
            ]
            .spacing(8),
        );

        view.into()
    }

    fn modal_view<'a>(&'a self, modal: &'a ModalState) -> Element<'a, Message> {
        let mut form_view = column![text(&modal.title).size(24)].spacing(10);
        for control in modal.form.controls() {
            form_view = form_view.push(field_control(control.field.name, control, Message::ModalField));
        }
        form_view = form_view.push(
            row![
                button("Save").on_press(Message::ModalSave),
                button("Cancel").on_press(Message::ModalCancel)
            ]
            .spacing(8),
        );

        container(scrollable(form_view))
            .width(Length::Fixed(480.0))
            .padding(24)
            .center_x()
            .into()
    }
}

fn field_control<'a>(
    name: &'static str,
    control: &'a flowdeck::FormControl,
    message: fn(&'static str, String) -> Message,
) -> Element<'a, Message> {
    let field = control.field;
    let label = text(field.label).size(14);
    let input: Element<Message> = match field.kind {
        FieldKind::Select => {
            let options: Vec<String> = field.options.iter().map(|o| o.to_string()).collect();
            let selected = if control.value.is_empty() {
                None
            } else {
                Some(control.value.clone())
            };
            pick_list(options, selected, move |value| message(name, value)).into()
        }
        // Plain inputs cover text, number, and textarea fields alike.
        _ => text_input(field.label, &control.value)
            .on_input(move |value| message(name, value))
            .into(),
    };
    column![label, input].spacing(2).into()
}

struct GraphView<'a> {
    snapshot: &'a GraphSnapshot,
    drag: Option<&'a GuiDrag>,
    pending_connect: Option<&'a EntityId>,
}

impl<'a> GraphView<'a> {
    /// Node's top-left corner in canvas units, honoring the live drag
    /// position for the node under the cursor.
    fn node_origin(&self, node: &Node) -> Point {
        if let Some(drag) = self.drag {
            if drag.node == node.id {
                let zoom = self.zoom();
                return Point::new(
                    (drag.position.x / zoom - drag.grab_x).max(0.0),
                    (drag.position.y / zoom - drag.grab_y).max(0.0),
                );
            }
        }
        Point::new(node.x as f32, node.y as f32)
    }

    fn zoom(&self) -> f32 {
        if self.snapshot.zoom > 0.0 {
            self.snapshot.zoom
        } else {
            1.0
        }
    }

    fn node_center(&self, id: &EntityId) -> Option<Point> {
        self.snapshot.nodes.iter().find(|n| n.id == *id).map(|n| {
            let origin = self.node_origin(n);
            Point::new(origin.x + NODE_WIDTH / 2.0, origin.y + NODE_HEIGHT / 2.0)
        })
    }
}

impl<'a> canvas::Program<Message> for GraphView<'a> {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<canvas::Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());
        let zoom = self.zoom();

        let grid_color = Color::from_rgba(0.6, 0.6, 0.6, 0.2);
        let mut y = 0.0;
        while y < bounds.height {
            frame.stroke(
                &canvas::Path::line(Point::new(0.0, y), Point::new(bounds.width, y)),
                canvas::Stroke {
                    style: canvas::Style::Solid(grid_color),
                    width: 1.0,
                    ..Default::default()
                },
            );
            y += GRID * zoom;
        }
        let mut x = 0.0;
        while x < bounds.width {
            frame.stroke(
                &canvas::Path::line(Point::new(x, 0.0), Point::new(x, bounds.height)),
                canvas::Stroke {
                    style: canvas::Style::Solid(grid_color),
                    width: 1.0,
                    ..Default::default()
                },
            );
            x += GRID * zoom;
        }

        for (source, target) in &self.snapshot.edges {
            if let (Some(from), Some(to)) = (self.node_center(source), self.node_center(target)) {
                frame.stroke(
                    &canvas::Path::line(
                        Point::new(from.x * zoom, from.y * zoom),
                        Point::new(to.x * zoom, to.y * zoom),
                    ),
                    canvas::Stroke {
                        style: canvas::Style::Solid(Color::from_rgb(0.85, 0.85, 0.85)),
                        width: 2.0,
                        ..Default::default()
                    },
                );
            }
        }

        for node in &self.snapshot.nodes {
            let origin = self.node_origin(node);
            let rect = Rectangle {
                x: origin.x * zoom,
                y: origin.y * zoom,
                width: NODE_WIDTH * zoom,
                height: NODE_HEIGHT * zoom,
            };
            let is_selected = self.snapshot.selected.as_ref() == Some(&node.id);
            let is_pending = self.pending_connect == Some(&node.id);
            let fill = if is_selected {
                Color::from_rgb(0.18, 0.35, 0.62)
            } else if is_pending {
                Color::from_rgb(0.16, 0.45, 0.38)
            } else {
                Color::from_rgb(0.23, 0.23, 0.26)
            };
            frame.fill_rectangle(rect.position(), rect.size(), fill);
            frame.stroke(
                &canvas::Path::rectangle(rect.position(), rect.size()),
                canvas::Stroke {
                    width: 2.0,
                    style: canvas::Style::Solid(Color::WHITE),
                    ..Default::default()
                },
            );
            frame.fill_text(canvas::Text {
                content: node.name.clone(),
                position: Point::new(rect.x + 8.0, rect.y + 16.0),
                color: Color::WHITE,
                size: iced::Pixels(15.0),
                ..Default::default()
            });
            frame.fill_text(canvas::Text {
                content: node.kind.label().to_string(),
                position: Point::new(rect.x + 8.0, rect.y + 36.0),
                color: Color::from_rgba(1.0, 1.0, 1.0, 0.7),
                size: iced::Pixels(12.0),
                ..Default::default()
            });

            let ports = node.kind.ports();
            if ports.inputs > 0 {
                frame.fill(
                    &canvas::Path::circle(
                        Point::new(rect.x, rect.y + rect.height / 2.0),
                        PORT_RADIUS * zoom,
                    ),
                    Color::from_rgb(0.3, 0.7, 0.9),
                );
            }
            for port in 0..ports.outputs {
                let spread = rect.height / (ports.outputs as f32 + 1.0);
                frame.fill(
                    &canvas::Path::circle(
                        Point::new(rect.x + rect.width, rect.y + spread * (port as f32 + 1.0)),
                        PORT_RADIUS * zoom,
                    ),
                    Color::from_rgb(0.1, 0.64, 0.5),
                );
            }
        }

        vec![frame.into_geometry()]
    }

    fn update(
        &self,
        _state: &mut Self::State,
        event: canvas::Event,
        _bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> (iced::event::Status, Option<Message>) {
        match event {
            canvas::Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                if let Some(position) = cursor.position() {
                    return (
                        iced::event::Status::Captured,
                        Some(Message::CanvasPressed(position)),
                    );
                }
            }
            canvas::Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) => {
                if let Some(position) = cursor.position() {
                    return (
                        iced::event::Status::Captured,
                        Some(Message::CanvasReleased(position)),
                    );
                }
            }
            canvas::Event::Mouse(mouse::Event::CursorMoved { position }) => {
                return (
                    iced::event::Status::Captured,
                    Some(Message::CanvasMoved(position)),
                );
            }
            _ => {}
        }
        (iced::event::Status::Ignored, None)
    }

    fn mouse_interaction(
        &self,
        _state: &Self::State,
        _bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> mouse::Interaction {
        if let Some(position) = cursor.position() {
            let zoom = self.zoom();
            let point = Point::new(position.x / zoom, position.y / zoom);
            if hit_node(self.snapshot, point).is_some() {
                return mouse::Interaction::Grab;
            }
        }
        mouse::Interaction::default()
    }
}

/// Hit test in unscaled canvas units; returns the node and the grab
/// offset within it.
fn hit_node(snapshot: &GraphSnapshot, point: Point) -> Option<(EntityId, Vector)> {
    for node in &snapshot.nodes {
        let x = node.x as f32;
        let y = node.y as f32;
        if point.x >= x && point.x <= x + NODE_WIDTH && point.y >= y && point.y <= y + NODE_HEIGHT {
            return Some((node.id.clone(), Vector::new(point.x - x, point.y - y)));
        }
    }
    None
}

fn hit_output_port(snapshot: &GraphSnapshot, point: Point) -> Option<EntityId> {
    let radius = PORT_RADIUS + 3.0;
    for node in &snapshot.nodes {
        let ports = node.kind.ports();
        for port in 0..ports.outputs {
            let spread = NODE_HEIGHT / (ports.outputs as f32 + 1.0);
            let cx = node.x as f32 + NODE_WIDTH;
            let cy = node.y as f32 + spread * (port as f32 + 1.0);
            let dx = point.x - cx;
            let dy = point.y - cy;
            if dx * dx + dy * dy <= radius * radius {
                return Some(node.id.clone());
            }
        }
    }
    None
}
