use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    datatypes::{
        DiagramKind, GeometricProperties, MeshHandle, PlasticProperties, Point2D,
        SectionForces, SectionGeometry, StressBundle, WarpingProperties,
    },
    error::SectionError,
};

/// Decodes and encodes objects in the external curve/mesh interchange
/// format. The encoded payloads are opaque to this crate.
pub trait CurveCodec {
    fn decode_polyline(&mut self, encoded: &Value) -> Result<Vec<Point2D>, SectionError>;

    /// Re-encodes the engine-side mesh into an interchange string.
    fn encode_mesh(&mut self, mesh: &MeshHandle) -> Result<String, SectionError>;
}

/// The external structural-analysis engine.
///
/// Stage ordering is part of the contract: every method takes the previous
/// stage's payload, so a caller cannot request warping properties before
/// geometric properties exist.
pub trait SectionEngine: CurveCodec {
    fn generate_mesh(
        &mut self,
        geometry: &SectionGeometry,
        mesh_size: f64,
    ) -> Result<MeshHandle, SectionError>;

    fn geometric_properties(
        &mut self,
        mesh: &MeshHandle,
    ) -> Result<GeometricProperties, SectionError>;

    fn warping_properties(
        &mut self,
        geometric: &GeometricProperties,
    ) -> Result<WarpingProperties, SectionError>;

    fn plastic_properties(
        &mut self,
        geometric: &GeometricProperties,
    ) -> Result<PlasticProperties, SectionError>;

    fn stress(
        &mut self,
        warping: &WarpingProperties,
        forces: &SectionForces,
    ) -> Result<StressBundle, SectionError>;

    /// Renders one diagram of the engine's current state and returns the
    /// raw PNG bytes.
    fn render(&mut self, kind: DiagramKind) -> Result<Vec<u8>, SectionError>;
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum EngineCommand<'a> {
    DecodeCurve {
        data: &'a Value,
    },
    Mesh {
        #[serde(flatten)]
        geometry: &'a SectionGeometry,
        mesh_size: f64,
    },
    Geometric,
    Warping,
    Plastic,
    Stress {
        #[serde(flatten)]
        forces: &'a SectionForces,
    },
    PlotOpen {
        kind: DiagramKind,
    },
    PlotCapture,
    PlotClose,
    EncodeMesh,
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum EngineReply<T> {
    Ok { data: T },
    Error { message: String },
}

/// Empty `data` payload for acknowledgement-only replies.
#[derive(Deserialize)]
struct Ack {}

#[derive(Deserialize)]
struct DecodedCurve {
    points: Vec<Point2D>,
}

#[derive(Deserialize)]
struct CapturedPlot {
    png: String,
}

#[derive(Deserialize)]
struct EncodedMesh {
    data: String,
}

/// Engine driven as a child process, one newline-delimited JSON request and
/// reply per stage. The child owns all mesh/section state between stages;
/// its stderr passes straight through to ours.
pub struct ProcessEngine {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ProcessEngine {
    pub fn spawn(command: &str) -> Result<ProcessEngine, SectionError> {
        let mut child = match Command::new(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                return Err(SectionError::Engine(format!(
                    "Failed to launch analysis engine '{}': {}",
                    command, err
                )));
            }
        };

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SectionError::Engine("Engine stdin unavailable".to_owned()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SectionError::Engine("Engine stdout unavailable".to_owned()))?;

        Ok(ProcessEngine {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Sends one command and parses the engine's reply. Transport and
    /// protocol failures are Engine errors; failures the engine itself
    /// reports are wrapped with `stage_error`.
    fn request<T: DeserializeOwned>(
        &mut self,
        command: &EngineCommand,
        stage_error: fn(String) -> SectionError,
    ) -> Result<T, SectionError> {
        let line = serde_json::to_string(command)?;
        writeln!(self.stdin, "{}", line)
            .and_then(|_| self.stdin.flush())
            .map_err(|err| SectionError::Engine(format!("Failed to write to engine: {err}")))?;

        let mut reply = String::new();
        let bytes_read = self
            .stdout
            .read_line(&mut reply)
            .map_err(|err| SectionError::Engine(format!("Failed to read from engine: {err}")))?;

        if bytes_read == 0 {
            return Err(SectionError::Engine(
                "Engine closed its output stream mid-session".to_owned(),
            ));
        }

        let reply: EngineReply<T> = serde_json::from_str(reply.trim()).map_err(|err| {
            SectionError::Engine(format!("Malformed reply from engine: {err}"))
        })?;

        match reply {
            EngineReply::Ok { data } => Ok(data),
            EngineReply::Error { message } => Err(stage_error(message)),
        }
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Scoped plotting context. `capture` closes the context on success; `Drop`
/// closes it on every other path, so a failed capture cannot leak render
/// state into the next diagram.
struct PlotGuard<'a> {
    engine: &'a mut ProcessEngine,
    open: bool,
}

impl<'a> PlotGuard<'a> {
    fn open(engine: &'a mut ProcessEngine, kind: DiagramKind) -> Result<PlotGuard<'a>, SectionError> {
        engine.request::<Ack>(&EngineCommand::PlotOpen { kind }, SectionError::Render)?;
        Ok(PlotGuard { engine, open: true })
    }

    fn capture(mut self) -> Result<Vec<u8>, SectionError> {
        let captured: CapturedPlot = self
            .engine
            .request(&EngineCommand::PlotCapture, SectionError::Render)?;

        self.open = false;
        self.engine
            .request::<Ack>(&EngineCommand::PlotClose, SectionError::Render)?;

        BASE64.decode(captured.png.as_bytes()).map_err(|err| {
            SectionError::Render(format!("Engine returned an invalid png payload: {err}"))
        })
    }
}

impl Drop for PlotGuard<'_> {
    fn drop(&mut self) {
        if self.open {
            let _ = self
                .engine
                .request::<Ack>(&EngineCommand::PlotClose, SectionError::Render);
        }
    }
}

impl CurveCodec for ProcessEngine {
    fn decode_polyline(&mut self, encoded: &Value) -> Result<Vec<Point2D>, SectionError> {
        let decoded: DecodedCurve = self.request(
            &EngineCommand::DecodeCurve { data: encoded },
            SectionError::GeometryDecode,
        )?;

        Ok(decoded.points)
    }

    fn encode_mesh(&mut self, _mesh: &MeshHandle) -> Result<String, SectionError> {
        let encoded: EncodedMesh =
            self.request(&EngineCommand::EncodeMesh, SectionError::Engine)?;

        Ok(encoded.data)
    }
}

impl SectionEngine for ProcessEngine {
    fn generate_mesh(
        &mut self,
        geometry: &SectionGeometry,
        mesh_size: f64,
    ) -> Result<MeshHandle, SectionError> {
        self.request(
            &EngineCommand::Mesh {
                geometry,
                mesh_size,
            },
            SectionError::Mesher,
        )
    }

    fn geometric_properties(
        &mut self,
        _mesh: &MeshHandle,
    ) -> Result<GeometricProperties, SectionError> {
        self.request(&EngineCommand::Geometric, SectionError::Analysis)
    }

    fn warping_properties(
        &mut self,
        _geometric: &GeometricProperties,
    ) -> Result<WarpingProperties, SectionError> {
        self.request(&EngineCommand::Warping, SectionError::Analysis)
    }

    fn plastic_properties(
        &mut self,
        _geometric: &GeometricProperties,
    ) -> Result<PlasticProperties, SectionError> {
        self.request(&EngineCommand::Plastic, SectionError::Analysis)
    }

    fn stress(
        &mut self,
        _warping: &WarpingProperties,
        forces: &SectionForces,
    ) -> Result<StressBundle, SectionError> {
        self.request(&EngineCommand::Stress { forces }, SectionError::Analysis)
    }

    fn render(&mut self, kind: DiagramKind) -> Result<Vec<u8>, SectionError> {
        PlotGuard::open(self, kind)?.capture()
    }
}
