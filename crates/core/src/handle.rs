//! The lazily resolved reference to the injected runtime's root object.
//!
//! Nothing downstream may cache a direct reference: reloads destroy and
//! recreate the target context, so every consumer goes through this
//! expression at the moment of use. Absence is "not ready", never an error.

use serde_json::Value;

use tether_runtime::Result;

use crate::intercept::InterceptOps;

/// Reference expression for the application root object.
///
/// Recomputed every evaluation; may resolve to nothing until the first
/// patch cycle and a subsequent page load have happened.
#[derive(Debug, Clone)]
pub struct ContextHandle {
	alias: String,
	frame_name: Option<String>,
}

impl ContextHandle {
	pub fn new(alias: impl Into<String>, frame_name: Option<String>) -> Self {
		Self {
			alias: alias.into(),
			frame_name,
		}
	}

	/// The resolution expression: prefer the direct global alias, fall back
	/// to the same alias on the well-known embedded frame, else the
	/// undefined sentinel. Never throws.
	pub fn resolution(&self) -> String {
		let alias = &self.alias;
		match &self.frame_name {
			Some(frame) => format!(
				"(function(){{var h=window.{alias};if(h){{return h;}}\
				try{{var f=window.frames[\"{frame}\"];if(f&&f.{alias}){{return f.{alias};}}}}catch(e){{}}\
				return undefined;}})()"
			),
			None => format!(
				"(function(){{var h=window.{alias};if(h){{return h;}}return undefined;}})()"
			),
		}
	}

	/// Wraps a caller expression so it sees the resolved root object as
	/// `app`, and evaluates to undefined when nothing is ready.
	pub fn wrap(&self, expr: &str) -> String {
		format!(
			"(function(){{var app={};if(!app){{return undefined;}}return ({expr});}})()",
			self.resolution()
		)
	}

	/// Evaluates the resolution against the session. `Value::Null` is the
	/// "not ready" sentinel.
	pub async fn resolve<O: InterceptOps + ?Sized>(&self, ops: &O) -> Result<Value> {
		ops.evaluate(&self.resolution()).await
	}

	/// True once the handle resolves to something non-null. Evaluation
	/// errors count as "not ready" here; callers wanting the error use
	/// [`ContextHandle::resolve`].
	pub async fn is_ready<O: InterceptOps + ?Sized>(&self, ops: &O) -> bool {
		matches!(self.resolve(ops).await, Ok(value) if !value.is_null())
	}
}
