//! Bounded-memory undo/redo history for edits applied to an atlas.
//!
//! Pixel-carrying actions own [`PooledBuffer`]s. Before an edit the caller reserves room with
//! [`UndoRedoManager::tryBeginRenting`], takes its buffers with [`UndoRedoManager::rentArray`],
//! and then pushes the finished action. Dropping an action hands its buffers back to the pool.

use {
	crate::{
		pool::{ArrayPool, PooledBuffer},
		Error, Image, Result, Vec2, Vec2Ext, HEIGHT, WIDTH,
	},
	log::debug,
	std::collections::VecDeque,
};

/// Canvas operation that can be replayed in both directions without stored pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transform {
	/// Growth anchored at the top-left corner.
	Resize { from: Vec2, to: Vec2 },
	Rotate { clockwise: bool },
	Flip { horizontal: bool },
	/// Square cells re-laid out row-major into a canvas with at least as many cells.
	Reflow { cellSize: usize, from: Vec2, to: Vec2 },
	Swap { a: Vec2, b: Vec2, size: Vec2 },
}

impl Transform {
	fn apply(&self, canvas: &mut Image, forward: bool) {
		match *self {
			Self::Resize { from, to } => *canvas = canvas.resized(if forward { to } else { from }),
			Self::Rotate { clockwise } => *canvas = canvas.rotated(clockwise == forward),
			Self::Flip { horizontal: true } => canvas.flipHorizontal(),
			Self::Flip { horizontal: false } => canvas.flipVertical(),
			Self::Reflow { cellSize, from, to } => {
				*canvas = canvas.reflowed(cellSize, if forward { to } else { from });
			}
			Self::Swap { a, b, size } => canvas.swapRegions(a, b, size),
		}
	}
}

#[derive(Debug)]
pub enum UndoableAction {
	BitmapEdit { origin: Vec2, size: Vec2, before: PooledBuffer, after: PooledBuffer },
	/// Crop or shrink anchored at the top-left corner; `before` holds the whole former canvas.
	Crop { before: PooledBuffer, beforeSize: Vec2, afterSize: Vec2 },
	Single(Transform),
	Double(Transform, Transform),
}

impl UndoableAction {
	pub fn undo(&self, canvas: &mut Image) {
		match self {
			Self::BitmapEdit { origin, size, before, .. } => canvas.writeRegion(*origin, *size, before),
			Self::Crop { before, beforeSize, .. } => {
				let mut restored = Image::fromDimensions(*beforeSize);
				let len = restored.data.len().min(before.len());
				restored.data[..len].copy_from_slice(&before[..len]);
				*canvas = restored;
			}
			Self::Single(transform) => transform.apply(canvas, false),
			Self::Double(first, second) => {
				second.apply(canvas, false);
				first.apply(canvas, false);
			}
		}
	}

	pub fn redo(&self, canvas: &mut Image) {
		match self {
			Self::BitmapEdit { origin, size, after, .. } => canvas.writeRegion(*origin, *size, after),
			Self::Crop { afterSize, .. } => *canvas = canvas.resized(*afterSize),
			Self::Single(transform) => transform.apply(canvas, true),
			Self::Double(first, second) => {
				first.apply(canvas, true);
				second.apply(canvas, true);
			}
		}
	}

	/// Pooled bytes held by this action.
	pub fn sizeInBytes(&self) -> usize {
		match self {
			Self::BitmapEdit { before, after, .. } => before.capacity() + after.capacity(),
			Self::Crop { before, .. } => before.capacity(),
			Self::Single(_) | Self::Double(..) => 0,
		}
	}

	/// Gives the action's buffers back to their pool.
	pub fn returnData(self) {
		drop(self);
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
	Acting,
	Renting { remaining: usize, arraySize: usize },
}

/// Marker for [`UndoRedoManager::isChangedSince`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Snapshot {
	undoDepth: usize,
	outOfMemoryClears: usize,
	redoClears: usize,
}

#[derive(Debug)]
pub struct UndoRedoManager {
	pool: ArrayPool,
	undoStack: VecDeque<UndoableAction>,
	redoStack: VecDeque<UndoableAction>,
	maxMemoryBytes: usize,
	state: State,
	outOfMemoryClears: usize,
	redoClears: usize,
}

impl UndoRedoManager {
	pub fn new(pool: ArrayPool, maxMemoryBytes: usize) -> Self {
		Self {
			pool,
			undoStack: VecDeque::new(),
			redoStack: VecDeque::new(),
			maxMemoryBytes,
			state: State::Acting,
			outOfMemoryClears: 0,
			redoClears: 0,
		}
	}

	pub fn memoryUsage(&self) -> usize {
		self.undoStack.iter().chain(&self.redoStack).map(UndoableAction::sizeInBytes).sum()
	}

	pub fn isActing(&self) -> bool {
		self.state == State::Acting
	}
	pub fn canUndo(&self) -> bool {
		!self.undoStack.is_empty()
	}
	pub fn canRedo(&self) -> bool {
		!self.redoStack.is_empty()
	}
	pub fn undoCount(&self) -> usize {
		self.undoStack.len()
	}
	pub fn redoCount(&self) -> usize {
		self.redoStack.len()
	}

	/// Reserves room for an edit needing `arraysNeeded` (1 or 2) buffers totalling `totalSize`
	/// bytes, evicting the oldest history as needed. `false` when even an empty history could not
	/// hold it.
	pub fn tryBeginRenting(&mut self, totalSize: usize, arraysNeeded: usize) -> Result<bool> {
		if !self.isActing() {
			return Err(Error::InvalidUsage("tryBeginRenting while already renting"));
		}
		if !(1..=2).contains(&arraysNeeded) {
			return Err(Error::InvalidUsage("an edit rents one or two arrays"));
		}
		let rounded = totalSize.max(arraysNeeded).checked_next_power_of_two();
		let Some(rounded) = rounded.filter(|&rounded| rounded <= self.maxMemoryBytes) else {
			debug!("{totalSize} bytes exceed the {} byte history ceiling", self.maxMemoryBytes);
			return Ok(false);
		};
		self.evictUntil(self.maxMemoryBytes - rounded);
		self.state = State::Renting { remaining: arraysNeeded, arraySize: rounded / arraysNeeded };
		Ok(true)
	}

	pub fn rentArray(&mut self) -> Result<PooledBuffer> {
		let State::Renting { remaining, arraySize } = self.state else {
			return Err(Error::InvalidUsage("rentArray without tryBeginRenting"));
		};
		self.state = if remaining > 1 { State::Renting { remaining: remaining - 1, arraySize } } else { State::Acting };
		Ok(self.pool.rent(arraySize))
	}

	fn evictUntil(&mut self, budget: usize) {
		let mut evicted = false;
		while self.memoryUsage() > budget {
			if let Some(oldest) = self.undoStack.pop_front() {
				oldest.returnData();
			} else if self.redoStack.is_empty() {
				break;
			} else {
				self.redoStack.clear();
			}
			evicted = true;
		}
		if evicted {
			self.outOfMemoryClears += 1;
			debug!("history trimmed to {} undo step(s), {} byte(s)", self.undoStack.len(), self.memoryUsage());
		}
	}

	fn push(&mut self, action: UndoableAction) -> Result<()> {
		if !self.isActing() {
			return Err(Error::InvalidUsage("push while renting"));
		}
		if !self.redoStack.is_empty() {
			self.redoStack.clear();
			self.redoClears += 1;
		}
		self.undoStack.push_back(action);
		while self.memoryUsage() > self.maxMemoryBytes && self.undoStack.len() > 1 {
			if let Some(oldest) = self.undoStack.pop_front() {
				oldest.returnData();
			}
			self.outOfMemoryClears += 1;
		}
		Ok(())
	}

	/// Pixels of `size` at `origin` changed from `before` to `after` (row-major BGRA).
	pub fn pushBitmapEditAction(&mut self, origin: Vec2, size: Vec2, before: PooledBuffer, after: PooledBuffer) -> Result<()> {
		self.push(UndoableAction::BitmapEdit { origin, size, before, after })
	}

	/// The canvas was cut down from `beforeSize` to `afterSize`; `before` holds the former pixels.
	pub fn pushCropAction(&mut self, before: PooledBuffer, beforeSize: Vec2, afterSize: Vec2) -> Result<()> {
		if afterSize[WIDTH] > beforeSize[WIDTH] || afterSize[HEIGHT] > beforeSize[HEIGHT] {
			return Err(Error::InvalidUsage("crop cannot grow the canvas"));
		}
		self.push(UndoableAction::Crop { before, beforeSize, afterSize })
	}

	pub fn pushResizeLargerAction(&mut self, beforeSize: Vec2, afterSize: Vec2) -> Result<()> {
		if afterSize[WIDTH] < beforeSize[WIDTH] || afterSize[HEIGHT] < beforeSize[HEIGHT] {
			return Err(Error::InvalidUsage("resize-larger cannot shrink the canvas"));
		}
		self.push(UndoableAction::Single(Transform::Resize { from: beforeSize, to: afterSize }))
	}

	/// Cells of `cellSize` were re-laid out row-major into a canvas of `afterSize`.
	pub fn pushResizeSortedAction(&mut self, cellSize: usize, beforeSize: Vec2, afterSize: Vec2) -> Result<()> {
		let isGrid = |size: Vec2| size[WIDTH] % cellSize == 0 && size[HEIGHT] % cellSize == 0;
		if cellSize == 0 || !isGrid(beforeSize) || !isGrid(afterSize) {
			return Err(Error::InvalidUsage("canvas sizes must be whole cells"));
		}
		if afterSize.area() < beforeSize.area() {
			return Err(Error::InvalidUsage("sorted resize cannot drop cells"));
		}
		self.push(UndoableAction::Single(Transform::Reflow { cellSize, from: beforeSize, to: afterSize }))
	}

	pub fn pushRotateAction(&mut self, clockwise: bool) -> Result<()> {
		self.push(UndoableAction::Single(Transform::Rotate { clockwise }))
	}

	pub fn pushFlipAction(&mut self, horizontal: bool, vertical: bool) -> Result<()> {
		let [h, v] = [Transform::Flip { horizontal: true }, Transform::Flip { horizontal: false }];
		match (horizontal, vertical) {
			(true, true) => self.push(UndoableAction::Double(h, v)),
			(true, false) => self.push(UndoableAction::Single(h)),
			(false, true) => self.push(UndoableAction::Single(v)),
			(false, false) => Err(Error::InvalidUsage("flip along no axis")),
		}
	}

	/// The `size` regions at `from` and `to` were exchanged.
	pub fn pushMoveAction(&mut self, from: Vec2, to: Vec2, size: Vec2) -> Result<()> {
		self.push(UndoableAction::Single(Transform::Swap { a: from, b: to, size }))
	}

	/// Replays the newest action backwards; `false` when there is none.
	pub fn undo(&mut self, canvas: &mut Image) -> Result<bool> {
		if !self.isActing() {
			return Err(Error::InvalidUsage("undo while renting"));
		}
		let Some(action) = self.undoStack.pop_back() else { return Ok(false) };
		action.undo(canvas);
		self.redoStack.push_back(action);
		Ok(true)
	}

	pub fn redo(&mut self, canvas: &mut Image) -> Result<bool> {
		if !self.isActing() {
			return Err(Error::InvalidUsage("redo while renting"));
		}
		let Some(action) = self.redoStack.pop_back() else { return Ok(false) };
		action.redo(canvas);
		self.undoStack.push_back(action);
		Ok(true)
	}

	pub fn clear(&mut self) {
		self.undoStack.clear();
		self.redoStack.clear();
		self.state = State::Acting;
	}

	pub fn snapshot(&self) -> Snapshot {
		Snapshot {
			undoDepth: self.undoStack.len(),
			outOfMemoryClears: self.outOfMemoryClears,
			redoClears: self.redoClears,
		}
	}

	pub fn isChangedSince(&self, snapshot: &Snapshot) -> bool {
		self.snapshot() != *snapshot
	}
}
