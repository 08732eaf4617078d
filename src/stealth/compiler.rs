//! Injection compiler
//!
//! Turns a fingerprint into an [`InitScript`]: an ordered list of pure-data
//! override directives plus the protocol-level overrides that must agree with
//! them. Rendering to JavaScript happens only at attach time, so nothing here
//! touches a browser.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use super::user_agent::parse_user_agent;
use crate::fingerprint::{Fingerprint, TargetBrowser, TargetOs, WebRtcPolicy};

/// WebGL enums answered from the fingerprint
const GL_VENDOR: u32 = 0x1F00;
const GL_RENDERER: u32 = 0x1F01;
const UNMASKED_VENDOR_WEBGL: u32 = 0x9245;
const UNMASKED_RENDERER_WEBGL: u32 = 0x9246;

/// Globals left behind by automation drivers. A trailing `*` matches a prefix.
const AUTOMATION_MARKERS: [&str; 16] = [
    "cdc_*",
    "$cdc_*",
    "$wdc_*",
    "__webdriver_evaluate",
    "__selenium_evaluate",
    "__webdriver_script_fn",
    "__webdriver_script_func",
    "__driver_evaluate",
    "__driver_unwrapped",
    "__fxdriver_evaluate",
    "__fxdriver_unwrapped",
    "__selenium_unwrapped",
    "_Selenium_IDE_Recorder",
    "domAutomation",
    "domAutomationController",
    "__playwright*",
];

/// Execution order of directive groups. Pages read navigator first during
/// feature detection, so it must already be consistent by then.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Navigator,
    Screen,
    Graphics,
    Environment,
}

/// Object a directive patches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OverrideTarget {
    /// Automation markers on the global object and document
    Automation,
    /// `Navigator.prototype`, or `WorkerNavigator.prototype` in workers
    Navigator,
    /// `navigator.plugins` and `navigator.mimeTypes`
    Plugins,
    Screen,
    /// `window.devicePixelRatio`
    Viewport,
    /// `WebGLRenderingContext` and `WebGL2RenderingContext` prototypes
    WebGl,
    /// 2D context readback and canvas export
    Canvas,
    /// `AudioBuffer` and `AnalyserNode` readback
    Audio,
    /// `AudioContext.prototype`. Offline contexts keep the rate they were built with.
    AudioContext,
    /// `Date` offsets and `Intl` defaults
    Timezone,
    /// `NetworkInformation.prototype`
    Connection,
    /// `Permissions.prototype`
    Permissions,
    /// `navigator.getBattery`
    Battery,
    /// Peer connection constructors and media devices
    WebRtc,
    /// `FontFaceSet.prototype`
    Fonts,
}

impl OverrideTarget {
    pub fn phase(self) -> Phase {
        match self {
            OverrideTarget::Automation | OverrideTarget::Navigator | OverrideTarget::Plugins => {
                Phase::Navigator
            }
            OverrideTarget::Screen | OverrideTarget::Viewport => Phase::Screen,
            OverrideTarget::WebGl
            | OverrideTarget::Canvas
            | OverrideTarget::Audio
            | OverrideTarget::AudioContext => Phase::Graphics,
            _ => Phase::Environment,
        }
    }

    /// Whether the target exists in worker global scopes
    pub fn in_workers(self) -> bool {
        matches!(
            self,
            OverrideTarget::Navigator
                | OverrideTarget::Connection
                | OverrideTarget::Permissions
                | OverrideTarget::Timezone
        )
    }

    fn js_name(self) -> &'static str {
        match self {
            OverrideTarget::Automation => "automation",
            OverrideTarget::Navigator => "navigator",
            OverrideTarget::Plugins => "plugins",
            OverrideTarget::Screen => "screen",
            OverrideTarget::Viewport => "viewport",
            OverrideTarget::WebGl => "webgl",
            OverrideTarget::Canvas => "canvas",
            OverrideTarget::Audio => "audio",
            OverrideTarget::AudioContext => "audioContext",
            OverrideTarget::Timezone => "timezone",
            OverrideTarget::Connection => "connection",
            OverrideTarget::Permissions => "permissions",
            OverrideTarget::Battery => "battery",
            OverrideTarget::WebRtc => "webrtc",
            OverrideTarget::Fonts => "fonts",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseKind {
    Canvas,
    WebGl,
    Audio,
}

/// What a directive installs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum DirectiveValue {
    /// Getter returning a fixed value
    Constant(Value),
    /// `getParameter` answers keyed by GL enum
    ParameterTable(BTreeMap<u32, Value>),
    /// Deterministic readback perturbation derived from a per-profile seed
    SeededNoise { seed: u32, noise: NoiseKind },
    /// Plugin or mime type list
    Entries(Value),
    /// Permission name to state
    PermissionStates(BTreeMap<String, String>),
    Battery { charging: bool, level: f64 },
    Timezone { zone: String, offset: i32, locale: String },
    FontList(Vec<String>),
    WebRtc(WebRtcPolicy),
    /// Global names to delete
    Scrub(Vec<String>),
}

impl DirectiveValue {
    fn op(&self) -> &'static str {
        match self {
            DirectiveValue::Constant(_) => "value",
            DirectiveValue::ParameterTable(_) => "params",
            DirectiveValue::SeededNoise { .. } => "noise",
            DirectiveValue::Entries(_) => "entries",
            DirectiveValue::PermissionStates(_) => "permissions",
            DirectiveValue::Battery { .. } => "battery",
            DirectiveValue::Timezone { .. } => "timezone",
            DirectiveValue::FontList(_) => "fonts",
            DirectiveValue::WebRtc(_) => "webrtc",
            DirectiveValue::Scrub(_) => "scrub",
        }
    }

    fn arg(&self) -> Value {
        match self {
            DirectiveValue::Constant(value) | DirectiveValue::Entries(value) => value.clone(),
            DirectiveValue::ParameterTable(table) => {
                Value::Object(table.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
            }
            DirectiveValue::SeededNoise { seed, noise } => json!({ "seed": seed, "kind": noise }),
            DirectiveValue::PermissionStates(states) => json!(states),
            DirectiveValue::Battery { charging, level } => json!({ "charging": charging, "level": level }),
            DirectiveValue::Timezone { zone, offset, locale } => {
                json!({ "zone": zone, "offset": offset, "locale": locale })
            }
            DirectiveValue::FontList(fonts) => json!(fonts),
            DirectiveValue::WebRtc(policy) => json!(policy),
            DirectiveValue::Scrub(names) => json!(names),
        }
    }
}

/// One spoofed property
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverrideDirective {
    pub target: OverrideTarget,
    pub property: String,
    pub value: DirectiveValue,
}

impl OverrideDirective {
    pub fn new(target: OverrideTarget, property: &str, value: DirectiveValue) -> Self {
        Self {
            target,
            property: property.to_string(),
            value,
        }
    }

    fn constant(target: OverrideTarget, property: &str, value: Value) -> Self {
        Self::new(target, property, DirectiveValue::Constant(value))
    }

    pub fn phase(&self) -> Phase {
        self.target.phase()
    }

    fn render(&self) -> String {
        format!(
            "apply({}, {}, {}, {});\n",
            Value::from(self.target.js_name()),
            Value::from(self.property.as_str()),
            Value::from(self.value.op()),
            self.value.arg()
        )
    }
}

/// Values applied through DevTools commands rather than script
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolOverrides {
    pub user_agent: String,
    pub accept_language: String,
    pub platform: String,
    pub timezone_id: String,
    pub locale: String,
    /// Client hints, Chromium only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent_metadata: Option<Value>,
}

/// Global scope a rendering targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptScope {
    Document,
    Worker,
}

/// Compiled, never persisted session-init script
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitScript {
    directives: Vec<OverrideDirective>,
    protocol: ProtocolOverrides,
}

impl InitScript {
    pub fn directives(&self) -> &[OverrideDirective] {
        &self.directives
    }

    pub fn protocol(&self) -> &ProtocolOverrides {
        &self.protocol
    }

    /// Script body for one scope. Expects the bindings set up by
    /// [`InitScript::render_guarded`].
    pub fn render(&self, scope: ScriptScope) -> String {
        let mut out = String::with_capacity(PRELUDE.len() + self.directives.len() * 96);
        out.push_str(PRELUDE);
        for directive in &self.directives {
            if scope == ScriptScope::Document || directive.target.in_workers() {
                out.push_str(&directive.render());
            }
        }
        out
    }

    /// Complete script with the revision guard. A document that already ran
    /// a script with the same key and an equal or higher revision skips this one.
    pub fn render_guarded(&self, scope: ScriptScope, guard_key: &str, revision: u64) -> String {
        let body = self.render(scope);
        let mut out = String::with_capacity(GUARD_HEAD.len() + body.len() + 128);
        out.push_str("(() => {\n'use strict';\nconst G = globalThis;\nconst K = Symbol.for(");
        out.push_str(&Value::from(guard_key).to_string());
        out.push_str(");\nconst REVISION = ");
        out.push_str(&revision.to_string());
        out.push_str(";\n");
        out.push_str(GUARD_HEAD);
        out.push_str(&body);
        out.push_str("})();\n");
        out
    }

    /// Self-contained script for running outside the injector, e.g. pasted
    /// into a console. Guarded by the digest instead of an injector key.
    pub fn render_standalone(&self, scope: ScriptScope) -> String {
        self.render_guarded(scope, &format!("standalone:{}", self.digest()), 1)
    }

    /// Stable content hash, used to recognise an unchanged script
    pub fn digest(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.render(ScriptScope::Document).hash(&mut hasher);
        self.render(ScriptScope::Worker).hash(&mut hasher);
        serde_json::to_string(&self.protocol)
            .unwrap_or_default()
            .hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

/// Fingerprint to directive compiler
#[derive(Debug, Clone, Copy, Default)]
pub struct InjectionCompiler;

impl InjectionCompiler {
    pub fn new() -> Self {
        Self
    }

    pub fn compile(&self, fp: &Fingerprint) -> InitScript {
        use OverrideTarget::*;

        let nav = &fp.navigator;
        let mut directives = vec![
            OverrideDirective::new(
                Automation,
                "*",
                DirectiveValue::Scrub(AUTOMATION_MARKERS.iter().map(|m| m.to_string()).collect()),
            ),
            OverrideDirective::constant(Navigator, "userAgent", json!(nav.user_agent)),
            OverrideDirective::constant(Navigator, "appVersion", json!(nav.app_version)),
            OverrideDirective::constant(Navigator, "platform", json!(nav.platform)),
            OverrideDirective::constant(Navigator, "vendor", json!(nav.vendor)),
            OverrideDirective::constant(Navigator, "language", json!(nav.language)),
            OverrideDirective::constant(Navigator, "languages", json!(nav.languages)),
            OverrideDirective::constant(Navigator, "hardwareConcurrency", json!(nav.hardware_concurrency)),
            OverrideDirective::constant(Navigator, "deviceMemory", json!(nav.device_memory)),
            OverrideDirective::constant(Navigator, "maxTouchPoints", json!(nav.max_touch_points)),
            OverrideDirective::constant(Navigator, "productSub", json!(nav.product_sub)),
            OverrideDirective::constant(Navigator, "doNotTrack", json!(nav.do_not_track)),
            OverrideDirective::constant(Navigator, "cookieEnabled", json!(nav.cookie_enabled)),
            OverrideDirective::constant(Navigator, "webdriver", json!(false)),
            OverrideDirective::new(Plugins, "plugins", DirectiveValue::Entries(json!(fp.misc.plugins))),
            OverrideDirective::new(
                Plugins,
                "mimeTypes",
                DirectiveValue::Entries(json!(fp.misc.mime_types)),
            ),
        ];

        let screen = &fp.screen;
        directives.extend([
            OverrideDirective::constant(Screen, "width", json!(screen.width)),
            OverrideDirective::constant(Screen, "height", json!(screen.height)),
            OverrideDirective::constant(Screen, "availWidth", json!(screen.avail_width)),
            OverrideDirective::constant(Screen, "availHeight", json!(screen.avail_height)),
            OverrideDirective::constant(Screen, "colorDepth", json!(screen.color_depth)),
            OverrideDirective::constant(Screen, "pixelDepth", json!(screen.pixel_depth)),
            OverrideDirective::constant(Viewport, "devicePixelRatio", json!(screen.pixel_ratio)),
        ]);

        let mut gl = BTreeMap::new();
        gl.insert(GL_VENDOR, json!(fp.webgl.vendor));
        gl.insert(GL_RENDERER, json!(fp.webgl.renderer));
        gl.insert(UNMASKED_VENDOR_WEBGL, json!(fp.webgl.unmasked_vendor));
        gl.insert(UNMASKED_RENDERER_WEBGL, json!(fp.webgl.unmasked_renderer));
        directives.extend([
            OverrideDirective::new(WebGl, "getParameter", DirectiveValue::ParameterTable(gl)),
            OverrideDirective::new(
                WebGl,
                "readPixels",
                DirectiveValue::SeededNoise { seed: fp.webgl.noise, noise: NoiseKind::WebGl },
            ),
            OverrideDirective::new(
                Canvas,
                "getImageData",
                DirectiveValue::SeededNoise { seed: fp.canvas.noise, noise: NoiseKind::Canvas },
            ),
            OverrideDirective::new(
                Audio,
                "getChannelData",
                DirectiveValue::SeededNoise { seed: fp.audio.noise, noise: NoiseKind::Audio },
            ),
            OverrideDirective::constant(AudioContext, "sampleRate", json!(fp.audio.sample_rate)),
        ]);

        let net = &fp.network;
        let permissions = fp
            .misc
            .permissions
            .iter()
            .map(|(name, state)| (name.clone(), state.as_str().to_string()))
            .collect();
        // Desktop machines report a full, charging battery
        let (charging, level) = match (fp.hardware.battery_charging, fp.hardware.battery_level) {
            (Some(charging), Some(level)) => (charging, level),
            _ => (true, 1.0),
        };
        directives.extend([
            OverrideDirective::new(
                Timezone,
                "Date",
                DirectiveValue::Timezone {
                    zone: fp.timezone.timezone.clone(),
                    offset: fp.timezone.timezone_offset,
                    locale: fp.timezone.locale.clone(),
                },
            ),
            OverrideDirective::constant(Connection, "type", json!(net.connection_type)),
            OverrideDirective::constant(Connection, "effectiveType", json!(net.effective_type)),
            OverrideDirective::constant(Connection, "downlink", json!(net.downlink)),
            OverrideDirective::constant(Connection, "rtt", json!(net.rtt)),
            OverrideDirective::constant(Connection, "saveData", json!(false)),
            OverrideDirective::new(Permissions, "query", DirectiveValue::PermissionStates(permissions)),
            OverrideDirective::new(Battery, "getBattery", DirectiveValue::Battery { charging, level }),
        ]);
        if net.web_rtc_policy != WebRtcPolicy::Default {
            directives.push(OverrideDirective::new(
                WebRtc,
                "RTCPeerConnection",
                DirectiveValue::WebRtc(net.web_rtc_policy),
            ));
        }
        directives.push(OverrideDirective::new(
            Fonts,
            "check",
            DirectiveValue::FontList(fp.fonts.installed_fonts.clone()),
        ));

        directives.sort_by_key(OverrideDirective::phase);

        InitScript {
            directives,
            protocol: protocol_overrides(fp),
        }
    }
}

/// `Accept-Language` with descending quality values
pub fn accept_language(languages: &[String]) -> String {
    languages
        .iter()
        .enumerate()
        .map(|(i, lang)| {
            if i == 0 {
                lang.clone()
            } else {
                let q = (10 - i.min(9)) as f64 / 10.0;
                format!("{};q={:.1}", lang, q)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn protocol_overrides(fp: &Fingerprint) -> ProtocolOverrides {
    let nav = &fp.navigator;
    let user_agent_metadata = parse_user_agent(&nav.user_agent)
        .filter(|claims| claims.browser.is_chromium())
        .map(|claims| {
            let brand = match claims.browser {
                TargetBrowser::Edge => "Microsoft Edge",
                _ => "Google Chrome",
            };
            let major = claims.major.to_string();
            let full = format!("{}.0.0.0", claims.major);
            let (platform_version, architecture) = match claims.os {
                TargetOs::Windows => ("15.0.0", "x86"),
                TargetOs::Macos if fp.webgl.unmasked_renderer.contains("Apple") => ("14.6.1", "arm"),
                TargetOs::Macos => ("14.6.1", "x86"),
                TargetOs::Linux => ("6.5.0", "x86"),
            };
            json!({
                "brands": [
                    { "brand": brand, "version": major },
                    { "brand": "Chromium", "version": major },
                    { "brand": "Not_A Brand", "version": "24" },
                ],
                "fullVersionList": [
                    { "brand": brand, "version": full },
                    { "brand": "Chromium", "version": full },
                    { "brand": "Not_A Brand", "version": "24.0.0.0" },
                ],
                "platform": claims.os.client_hint_platform(),
                "platformVersion": platform_version,
                "architecture": architecture,
                "bitness": "64",
                "model": "",
                "mobile": false,
            })
        });

    ProtocolOverrides {
        user_agent: nav.user_agent.clone(),
        accept_language: accept_language(&nav.languages),
        platform: nav.platform.clone(),
        timezone_id: fp.timezone.timezone.clone(),
        locale: fp.timezone.locale.clone(),
        user_agent_metadata,
    }
}

/// Shared state and `Function.prototype.toString` masking, installed once per
/// global scope; then the revision check.
const GUARD_HEAD: &str = r#"let S = G[K];
if (!S) {
  S = { rev: 0, natives: new WeakMap(), masked: new WeakMap() };
  Object.defineProperty(G, K, { value: S, enumerable: false, configurable: false, writable: false });
  const nativeToString = Function.prototype.toString;
  const toString = function toString() {
    const label = S.masked.get(this);
    return label !== undefined ? label : nativeToString.call(this);
  };
  S.masked.set(toString, 'function toString() { [native code] }');
  Function.prototype.toString = toString;
}
if (S.rev >= REVISION) return;
S.rev = REVISION;
"#;

const PRELUDE: &str = r#"const own = (o, k) => Object.prototype.hasOwnProperty.call(o, k);
const nativeOf = (obj, name) => {
  let table = S.natives.get(obj);
  if (!table) {
    table = new Map();
    S.natives.set(obj, table);
  }
  if (!table.has(name)) table.set(name, Object.getOwnPropertyDescriptor(obj, name));
  return table.get(name);
};
const mask = (fn, label) => {
  S.masked.set(fn, 'function ' + label + '() { [native code] }');
  try { Object.defineProperty(fn, 'name', { value: label, configurable: true }); } catch (e) {}
  return fn;
};
const define = (obj, name, value) => {
  if (!(name in obj)) return;
  const desc = nativeOf(obj, name);
  const fixed = Array.isArray(value) ? Object.freeze(value.slice()) : value;
  const get = mask(function () { return fixed; }, 'get ' + name);
  Object.defineProperty(obj, name, {
    get, set: undefined, enumerable: desc ? desc.enumerable : true, configurable: true,
  });
};
const wrap = (obj, name, make) => {
  const desc = nativeOf(obj, name);
  if (!desc || typeof desc.value !== 'function') return;
  const replacement = mask(make(desc.value), name);
  Object.defineProperty(obj, name, Object.assign({}, desc, { value: replacement }));
};
const mix = (seed, i) => {
  let h = (seed ^ Math.imul(i | 0, 0x9e3779b1)) >>> 0;
  h = Math.imul(h ^ (h >>> 16), 0x85ebca6b);
  h = Math.imul(h ^ (h >>> 13), 0xc2b2ae35);
  return (h ^ (h >>> 16)) >>> 0;
};
const perturbPixels = (data, seed) => {
  for (let i = 0; i < data.length; i += 4) {
    const h = mix(seed, i >> 2);
    if ((h & 0xff) < 6) {
      const c = i + ((h >>> 8) % 3);
      data[c] = data[c] ^ 1;
    }
  }
  return data;
};
const jitter = (seed, i, scale) => ((mix(seed, i) / 4294967296) - 0.5) * scale;
const entry = (proto, fields) => {
  const item = Object.create(proto || Object.prototype);
  for (const key of Object.keys(fields)) {
    Object.defineProperty(item, key, { value: fields[key], enumerable: true });
  }
  return item;
};
const listOf = (proto, items, key) => {
  const list = Object.create(proto || Object.prototype);
  items.forEach((item, i) => Object.defineProperty(list, i, { value: item, enumerable: true }));
  items.forEach((item) => { if (!own(list, item[key])) Object.defineProperty(list, item[key], { value: item }); });
  Object.defineProperties(list, {
    length: { get: mask(function () { return items.length; }, 'get length') },
    item: { value: mask(function item(i) { return items[i] || null; }, 'item') },
    namedItem: { value: mask(function namedItem(n) { return items.find((it) => it[key] === n) || null; }, 'namedItem') },
    [Symbol.iterator]: { value: mask(function values() { return items[Symbol.iterator](); }, 'values') },
  });
  return list;
};
const NOISE = {
  canvas: (obj, name, seed) => {
    const readImage = nativeOf(obj, name) && nativeOf(obj, name).value;
    if (!readImage) return;
    wrap(obj, name, (native) => function getImageData() {
      const image = native.apply(this, arguments);
      perturbPixels(image.data, seed);
      return image;
    });
    const canvasProto = G.HTMLCanvasElement && G.HTMLCanvasElement.prototype;
    if (!canvasProto) return;
    const noisyCopy = (canvas) => {
      if (!canvas.width || !canvas.height) return canvas;
      const copy = document.createElement('canvas');
      copy.width = canvas.width;
      copy.height = canvas.height;
      const ctx = copy.getContext('2d');
      if (!ctx) return canvas;
      ctx.drawImage(canvas, 0, 0);
      const image = readImage.call(ctx, 0, 0, copy.width, copy.height);
      perturbPixels(image.data, seed);
      ctx.putImageData(image, 0, 0);
      return copy;
    };
    wrap(canvasProto, 'toDataURL', (native) => function toDataURL() {
      return native.apply(noisyCopy(this), arguments);
    });
    wrap(canvasProto, 'toBlob', (native) => function toBlob() {
      return native.apply(noisyCopy(this), arguments);
    });
  },
  webgl: (obj, name, seed) => wrap(obj, name, (native) => function readPixels() {
    const result = native.apply(this, arguments);
    const pixels = arguments[6];
    if (pixels instanceof Uint8Array || pixels instanceof Uint8ClampedArray) perturbPixels(pixels, seed);
    return result;
  }),
  audio: (obj, name, seed) => {
    const touched = new WeakMap();
    wrap(obj, name, (native) => function getChannelData(channel) {
      const data = native.apply(this, arguments);
      let seen = touched.get(this);
      if (!seen) {
        seen = new Set();
        touched.set(this, seen);
      }
      if (!seen.has(channel)) {
        seen.add(channel);
        for (let i = 0; i < data.length; i += 100) data[i] += jitter(seed, i, 1e-7);
      }
      return data;
    });
    const analyser = G.AnalyserNode && G.AnalyserNode.prototype;
    if (analyser) {
      wrap(analyser, 'getFloatFrequencyData', (native) => function getFloatFrequencyData(array) {
        const result = native.apply(this, arguments);
        for (let i = 0; i < array.length; i++) array[i] += jitter(seed, i, 1e-4);
        return result;
      });
    }
  },
};
const OPS = {
  value: (obj, name, value) => define(obj, name, value),
  params: (obj, name, table) => wrap(obj, name, (native) => function getParameter(p) {
    if (own(table, p)) return table[p];
    return native.apply(this, arguments);
  }),
  noise: (obj, name, arg) => NOISE[arg.kind](obj, name, arg.seed),
  entries: (obj, name, items) => {
    if (!(name in obj)) return;
    if (name === 'plugins') {
      const plugins = items.map((p) => entry(G.Plugin && G.Plugin.prototype, p));
      define(obj, name, listOf(G.PluginArray && G.PluginArray.prototype, plugins, 'name'));
    } else {
      const types = items.map((m) => entry(G.MimeType && G.MimeType.prototype, m));
      define(obj, name, listOf(G.MimeTypeArray && G.MimeTypeArray.prototype, types, 'type'));
    }
  },
  permissions: (obj, name, states) => {
    wrap(obj, name, (native) => function query(descriptor) {
      const pending = native.apply(this, arguments);
      if (!descriptor || !own(states, descriptor.name)) return pending;
      const wanted = states[descriptor.name];
      return pending.then((status) => {
        Object.defineProperty(status, 'state', {
          get: mask(function () { return wanted; }, 'get state'), configurable: true,
        });
        return status;
      });
    });
    if (G.Notification && own(states, 'notifications')) {
      const state = states.notifications;
      define(G.Notification, 'permission', state === 'prompt' ? 'default' : state);
    }
  },
  battery: (obj, name, info) => wrap(obj, name, (native) => function getBattery() {
    return native.apply(this, arguments).then((manager) => {
      const values = {
        charging: info.charging,
        level: info.level,
        chargingTime: info.charging && info.level >= 1 ? 0 : Infinity,
        dischargingTime: info.charging ? Infinity : Math.round(info.level * 18000),
      };
      for (const key of Object.keys(values)) {
        Object.defineProperty(manager, key, {
          get: mask(function () { return values[key]; }, 'get ' + key), configurable: true,
        });
      }
      return manager;
    });
  }),
  timezone: (obj, name, tz) => {
    const NativeFormat = nativeOf(G.Intl, 'DateTimeFormat').value;
    let formatter = null;
    try {
      formatter = new NativeFormat('en-US', {
        timeZone: tz.zone, hourCycle: 'h23', year: 'numeric', month: 'numeric',
        day: 'numeric', hour: 'numeric', minute: 'numeric', second: 'numeric',
      });
    } catch (e) {
      formatter = null;
    }
    const offsetAt = (time) => {
      if (!formatter || !isFinite(time)) return tz.offset;
      const parts = {};
      for (const part of formatter.formatToParts(time)) parts[part.type] = part.value;
      const local = Date.UTC(+parts.year, +parts.month - 1, +parts.day, +parts.hour % 24, +parts.minute, +parts.second);
      return Math.round((Math.floor(time / 1000) * 1000 - local) / 60000);
    };
    const timeOf = nativeOf(G.Date.prototype, 'getTime').value;
    wrap(G.Date.prototype, 'getTimezoneOffset', () => function getTimezoneOffset() {
      return offsetAt(timeOf.call(this));
    });
    const host = new NativeFormat().resolvedOptions();
    wrap(NativeFormat.prototype, 'resolvedOptions', (native) => function resolvedOptions() {
      const options = native.apply(this, arguments);
      if (options.timeZone === host.timeZone) options.timeZone = tz.zone;
      if (options.locale === host.locale) options.locale = tz.locale;
      return options;
    });
  },
  fonts: (obj, name, installed) => {
    const known = new Set(installed.map((f) => f.toLowerCase()));
    const generic = new Set(['serif', 'sans-serif', 'monospace', 'cursive', 'fantasy', 'system-ui',
      'emoji', 'math', 'fangsong', 'ui-serif', 'ui-sans-serif', 'ui-monospace', 'ui-rounded']);
    wrap(obj, name, (native) => function check(font) {
      const families = String(font)
        .replace(/^.*?\d+(?:\.\d+)?(?:px|pt|em|rem|%)\s*(?:\/\s*\S+\s*)?/, '')
        .split(',')
        .map((f) => f.trim().replace(/^["']|["']$/g, '').toLowerCase())
        .filter(Boolean);
      if (!families.length || families.every((f) => generic.has(f))) return native.apply(this, arguments);
      return families.some((f) => known.has(f));
    });
  },
  webrtc: (obj, name, policy) => {
    if (policy === 'disable') {
      for (const key of ['RTCPeerConnection', 'webkitRTCPeerConnection', 'RTCDataChannel', 'RTCIceCandidate', 'RTCSessionDescription']) {
        if (key in G) {
          try { delete G[key]; } catch (e) {}
        }
      }
      const devices = G.MediaDevices && G.MediaDevices.prototype;
      if (devices) {
        wrap(devices, 'enumerateDevices', () => function enumerateDevices() { return Promise.resolve([]); });
        wrap(devices, 'getUserMedia', () => function getUserMedia() {
          return Promise.reject(new DOMException('Permission denied', 'NotAllowedError'));
        });
      }
      return;
    }
    const desc = nativeOf(G, name);
    if (!desc || typeof desc.value !== 'function') return;
    const Native = desc.value;
    const relay = (config) => Object.assign({}, config, { iceTransportPolicy: 'relay' });
    const Relay = mask(function RTCPeerConnection(config, ...rest) {
      return Reflect.construct(Native, [relay(config), ...rest], new.target || Relay);
    }, name);
    Relay.prototype = Native.prototype;
    Object.defineProperty(G, name, Object.assign({}, desc, { value: Relay }));
    if ('webkitRTCPeerConnection' in G) Object.defineProperty(G, 'webkitRTCPeerConnection', Object.assign({}, desc, { value: Relay }));
    wrap(Native.prototype, 'setConfiguration', (native) => function setConfiguration(config) {
      return native.call(this, relay(config));
    });
  },
  scrub: (obj, name, markers) => {
    const matches = (key) => markers.some((m) => (m.endsWith('*') ? key.startsWith(m.slice(0, -1)) : key === m));
    const sweep = (o) => {
      if (!o) return;
      for (const key of Object.getOwnPropertyNames(o)) {
        if (matches(key)) {
          try { delete o[key]; } catch (e) {}
        }
      }
    };
    sweep(obj);
    if (obj.document) sweep(obj.document);
  },
};
const resolve = (target) => {
  switch (target) {
    case 'navigator':
    case 'plugins':
    case 'battery':
      return [(G.Navigator || G.WorkerNavigator || {}).prototype];
    case 'screen': return [G.Screen && G.Screen.prototype];
    case 'webgl': return [G.WebGLRenderingContext && G.WebGLRenderingContext.prototype, G.WebGL2RenderingContext && G.WebGL2RenderingContext.prototype];
    case 'canvas': return [G.CanvasRenderingContext2D && G.CanvasRenderingContext2D.prototype];
    case 'audio': return [G.AudioBuffer && G.AudioBuffer.prototype];
    case 'audioContext': return [G.AudioContext && G.AudioContext.prototype];
    case 'connection': return [G.NetworkInformation && G.NetworkInformation.prototype];
    case 'permissions': return [G.Permissions && G.Permissions.prototype];
    case 'fonts': return [G.FontFaceSet && G.FontFaceSet.prototype];
    default: return [G];
  }
};
const apply = (target, name, op, arg) => {
  for (const obj of resolve(target)) {
    if (!obj) continue;
    try { OPS[op](obj, name, arg); } catch (e) {}
  }
};
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::tests::sample_fingerprint;

    #[test]
    fn test_compile_is_deterministic() {
        let fp = sample_fingerprint();
        let a = InjectionCompiler::new().compile(&fp);
        let b = InjectionCompiler::new().compile(&fp);
        assert_eq!(a, b);
        assert_eq!(a.render(ScriptScope::Document), b.render(ScriptScope::Document));
        assert_eq!(a.render_guarded(ScriptScope::Worker, "k", 3), b.render_guarded(ScriptScope::Worker, "k", 3));
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_phase_order() {
        let script = InjectionCompiler::new().compile(&sample_fingerprint());
        let phases: Vec<Phase> = script.directives().iter().map(|d| d.phase()).collect();
        let mut sorted = phases.clone();
        sorted.sort();
        assert_eq!(phases, sorted);
        assert_eq!(phases.first(), Some(&Phase::Navigator));
        assert_eq!(phases.last(), Some(&Phase::Environment));

        let body = script.render(ScriptScope::Document);
        let nav = body.find(r#"apply("navigator", "platform""#).unwrap();
        let screen = body.find(r#"apply("screen", "width""#).unwrap();
        let gl = body.find(r#"apply("webgl", "getParameter""#).unwrap();
        assert!(nav < screen && screen < gl);
    }

    #[test]
    fn test_noise_compiles_to_seeded_function() {
        let fp = sample_fingerprint();
        let script = InjectionCompiler::new().compile(&fp);
        let canvas = script
            .directives()
            .iter()
            .find(|d| d.target == OverrideTarget::Canvas)
            .unwrap();
        assert_eq!(
            canvas.value,
            DirectiveValue::SeededNoise { seed: fp.canvas.noise, noise: NoiseKind::Canvas }
        );
        let body = script.render(ScriptScope::Document);
        assert!(body.contains(&format!(r#""seed":{}"#, fp.canvas.noise)));
        assert!(!body.contains("Math.random"));
    }

    #[test]
    fn test_values_come_from_fingerprint() {
        let mut fp = sample_fingerprint();
        fp.navigator.hardware_concurrency = 4;
        fp.navigator.device_memory = 8;
        let body = InjectionCompiler::new().compile(&fp).render(ScriptScope::Document);
        assert!(body.contains(r#"apply("navigator", "hardwareConcurrency", "value", 4);"#));
        assert!(body.contains(r#"apply("navigator", "deviceMemory", "value", 8);"#));
        assert!(body.contains(r#"apply("navigator", "webdriver", "value", false);"#));
        assert!(body.contains("ANGLE (NVIDIA, NVIDIA GeForce RTX 3060"));
        assert!(body.contains(r#""37446":"#));
    }

    #[test]
    fn test_worker_scope_is_restricted() {
        let script = InjectionCompiler::new().compile(&sample_fingerprint());
        let worker = script.render(ScriptScope::Worker);
        assert!(worker.starts_with(PRELUDE));
        assert!(worker.contains(r#"apply("navigator", "userAgent""#));
        assert!(worker.contains(r#"apply("timezone", "Date""#));
        assert!(!worker.contains(r#"apply("screen""#));
        assert!(!worker.contains(r#"apply("webgl""#));
        assert!(!worker.contains(r#"apply("plugins""#));
    }

    #[test]
    fn test_webrtc_policy_directives() {
        let mut fp = sample_fingerprint();
        let script = InjectionCompiler::new().compile(&fp);
        let body = script.render(ScriptScope::Document);
        assert!(body.contains(r#"apply("webrtc", "RTCPeerConnection", "webrtc", "disable");"#));
        // Disabled media capture rejects instead of prompting
        let disable = &body[body.find("if (policy === 'disable')").unwrap()..];
        let disable = &disable[..disable.find("return;").unwrap()];
        assert!(disable.contains("wrap(devices, 'getUserMedia'"));
        assert!(disable.contains("'NotAllowedError'"));

        fp.network.web_rtc_policy = WebRtcPolicy::Default;
        let script = InjectionCompiler::new().compile(&fp);
        assert!(script.directives().iter().all(|d| d.target != OverrideTarget::WebRtc));
    }

    #[test]
    fn test_sample_rate_targets_audio_context() {
        let mut fp = sample_fingerprint();
        fp.audio.sample_rate = 48000;
        let script = InjectionCompiler::new().compile(&fp);

        let rate = script
            .directives()
            .iter()
            .find(|d| d.property == "sampleRate")
            .unwrap();
        assert_eq!(rate.target, OverrideTarget::AudioContext);
        assert_eq!(rate.value, DirectiveValue::Constant(json!(48000)));

        let body = script.render(ScriptScope::Document);
        assert!(body.contains(r#"apply("audioContext", "sampleRate", "value", 48000);"#));
        assert!(body.contains("case 'audioContext': return [G.AudioContext && G.AudioContext.prototype];"));
        // AudioBuffer only gets readback noise
        assert!(script
            .directives()
            .iter()
            .filter(|d| d.target == OverrideTarget::Audio)
            .all(|d| d.property == "getChannelData"));
        assert!(!script.render(ScriptScope::Worker).contains(r#"apply("audioContext""#));
    }

    #[test]
    fn test_guard_wraps_body() {
        let script = InjectionCompiler::new().compile(&sample_fingerprint());
        let guarded = script.render_guarded(ScriptScope::Document, "abc", 7);
        assert!(guarded.starts_with("(() => {"));
        assert!(guarded.contains(r#"Symbol.for("abc")"#));
        assert!(guarded.contains("const REVISION = 7;"));
        assert!(guarded.contains(&script.render(ScriptScope::Document)));
        assert!(guarded.trim_end().ends_with("})();"));
    }

    #[test]
    fn test_standalone_rendering_binds_guard_names() {
        let script = InjectionCompiler::new().compile(&sample_fingerprint());
        let standalone = script.render_standalone(ScriptScope::Document);
        let body = script.render(ScriptScope::Document);
        let start = standalone.find(&body).unwrap();
        let head = &standalone[..start];
        for binding in ["const G = globalThis;", "const K = Symbol.for(", "let S = G[K];"] {
            assert!(head.contains(binding), "missing {}", binding);
        }
        // Revision 0 would be skipped by a fresh global
        assert!(head.contains("const REVISION = 1;"));
        assert_eq!(standalone, script.render_standalone(ScriptScope::Document));
    }

    #[test]
    fn test_protocol_overrides() {
        let script = InjectionCompiler::new().compile(&sample_fingerprint());
        let protocol = script.protocol();
        assert_eq!(protocol.accept_language, "en-US,en;q=0.9");
        assert_eq!(protocol.timezone_id, "America/New_York");
        assert_eq!(protocol.platform, "Win32");
        let metadata = protocol.user_agent_metadata.as_ref().unwrap();
        assert_eq!(metadata["platform"], "Windows");
        assert_eq!(metadata["brands"][0]["brand"], "Google Chrome");
        assert_eq!(metadata["brands"][0]["version"], "131");
    }

    #[test]
    fn test_accept_language_quality() {
        let langs: Vec<String> = ["de-DE", "de", "en-US", "en"].iter().map(|s| s.to_string()).collect();
        assert_eq!(accept_language(&langs), "de-DE,de;q=0.9,en-US;q=0.8,en;q=0.7");
    }

    #[test]
    fn test_digest_tracks_content() {
        let mut fp = sample_fingerprint();
        let before = InjectionCompiler::new().compile(&fp).digest();
        fp.screen.width = 2560;
        let after = InjectionCompiler::new().compile(&fp).digest();
        assert_ne!(before, after);
    }
}
