#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use crossbeam_channel::{bounded, Sender};
    use rand::Rng;

    use crate::emulator::{EmulationCore, EmulationDriver, StepResult};
    use crate::error::{BridgeError, SurfaceError};
    use crate::memory::{
        BufferMode, SharedFrameBuffer, BYTES_PER_PIXEL, GRAPHIC_MEMORY_SIZE, ROW_STRIDE, SCREEN_HEIGHT,
        SCREEN_WIDTH,
    };
    use crate::presenter::{image_channel, FramePresenter, PresentStatus, ReadbackPresenter};
    use crate::refresh_clock::{Cadence, RefreshClock};
    use crate::texture::{MutableTexture, Surface};
    use crate::DisplayBridge;

    fn presenter_for(buffer: &Arc<SharedFrameBuffer>) -> FramePresenter<MutableTexture> {
        FramePresenter::new(buffer.clone(), MutableTexture::new(SCREEN_WIDTH, SCREEN_HEIGHT)).unwrap()
    }

    #[test]
    fn white_screen_presents_white() {
        let buffer = Arc::new(SharedFrameBuffer::new(BufferMode::Single));
        buffer.fill(0xff);
        let mut presenter = presenter_for(&buffer);

        assert_eq!(presenter.present_frame(), PresentStatus::Presented);
        let texture = presenter.surface();
        assert_eq!(texture.pixel(0, 0), Some([0xff, 0xff, 0xff, 0xff]));
        assert_eq!(texture.pixel(319, 239), Some([0xff, 0xff, 0xff, 0xff]));
        assert_eq!(texture.submissions(), 1);
    }

    #[test]
    fn horizontal_gradient_lands_in_the_red_channel() {
        let buffer = Arc::new(SharedFrameBuffer::new(BufferMode::Single));
        let mut row = vec![0u8; ROW_STRIDE];
        for (x, pixel) in row.chunks_mut(BYTES_PER_PIXEL).enumerate() {
            pixel.copy_from_slice(&[(x % 256) as u8, 0, 0, 0xff]);
        }
        for y in 0..SCREEN_HEIGHT {
            buffer.write_region(y * ROW_STRIDE, &row).unwrap();
        }

        let mut presenter = presenter_for(&buffer);
        presenter.present_frame();
        for &x in &[0usize, 1, 100, 255, 256, 300, 319] {
            for &y in &[0usize, 120, 239] {
                let pixel = presenter.surface().pixel(x, y).unwrap();
                assert_eq!(pixel[0], (x % 256) as u8, "red at ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn presenting_twice_without_writes_is_identical() {
        let buffer = Arc::new(SharedFrameBuffer::new(BufferMode::Double));
        let mut rng = rand::thread_rng();
        let noise: Vec<u8> = (0..GRAPHIC_MEMORY_SIZE).map(|_| rng.gen()).collect();
        buffer.write_region(0, &noise).unwrap();
        buffer.publish();

        let mut presenter = presenter_for(&buffer);
        presenter.present_frame();
        let first = presenter.surface().data().to_vec();
        presenter.present_frame();
        assert_eq!(presenter.surface().data(), &first[..]);
        assert_eq!(first, noise);
    }

    #[test]
    fn concurrent_writes_never_leave_the_buffer() {
        let buffer = Arc::new(SharedFrameBuffer::new(BufferMode::Single));

        let writer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for offset in 0..GRAPHIC_MEMORY_SIZE {
                    buffer.write_region(offset, &[offset as u8]).unwrap();
                }
                for _ in 0..10_000 {
                    let offset = rng.gen_range(GRAPHIC_MEMORY_SIZE - 16..GRAPHIC_MEMORY_SIZE + 16);
                    let len = rng.gen_range(0..32);
                    let bytes = vec![0x5a; len];
                    let result = buffer.write_region(offset, &bytes);
                    if offset + len <= GRAPHIC_MEMORY_SIZE {
                        assert_eq!(result, Ok(()));
                    } else {
                        assert_eq!(result, Err(BridgeError::OutOfBounds { offset, len }));
                    }
                }
                assert!(buffer.write_region(usize::MAX - 1, &[0; 4]).is_err());
            })
        };

        let mut presenter = presenter_for(&buffer);
        let mut presents = 0;
        while !writer.is_finished() {
            assert_eq!(presenter.present_frame(), PresentStatus::Presented);
            presents += 1;
        }
        writer.join().unwrap();
        assert!(presents > 0);

        // Everything written before this present started must show up
        presenter.present_frame();
        assert_eq!(presenter.surface().data(), &buffer.graphic_memory()[..]);
        assert_eq!(presenter.surface().data()[0x1234], 0x34);
    }

    #[test]
    fn double_buffer_presents_whole_frames() {
        let buffer = Arc::new(SharedFrameBuffer::new(BufferMode::Double));

        let writer = {
            let buffer = buffer.clone();
            thread::spawn(move || {
                for frame in 0..40u8 {
                    let value = if frame % 2 == 0 { 0x11 } else { 0xee };
                    buffer.fill(value);
                    buffer.publish();
                    thread::sleep(Duration::from_millis(10));
                }
            })
        };

        let mut presenter = presenter_for(&buffer);
        while !writer.is_finished() {
            presenter.present_frame();
            let data = presenter.surface().data();
            let first = data[0];
            assert!(data.iter().all(|b| *b == first), "torn frame");
            thread::sleep(Duration::from_millis(3));
        }
        writer.join().unwrap();
    }

    struct Scribbler;

    impl EmulationCore for Scribbler {
        fn step(&mut self, display: &SharedFrameBuffer) -> StepResult {
            let mut rng = rand::thread_rng();
            let offset = rng.gen_range(0..GRAPHIC_MEMORY_SIZE - 64);
            let value: u8 = rng.gen();
            let _ = display.write_region(offset, &[value; 64]);
            StepResult::running(64)
        }
    }

    // Signals when a present is under way and makes it last a while
    struct SlowSurface {
        texture: MutableTexture,
        entered: Sender<()>,
    }

    impl Surface for SlowSurface {
        fn size(&self) -> (usize, usize) {
            self.texture.size()
        }

        fn bytes_per_row(&self) -> usize {
            self.texture.bytes_per_row()
        }

        fn pixel_data_mut(&mut self) -> Result<&mut [u8], SurfaceError> {
            let _ = self.entered.try_send(());
            self.texture.pixel_data_mut()
        }

        fn submit(&mut self) -> Result<(), SurfaceError> {
            thread::sleep(Duration::from_millis(3));
            self.texture.submit()
        }
    }

    #[test]
    fn teardown_during_a_present_releases_everything() {
        for _ in 0..10 {
            let buffer = Arc::new(SharedFrameBuffer::new(BufferMode::Single));
            let memory = Arc::downgrade(&buffer);
            let (entered_sender, entered) = bounded(1);
            let surface = SlowSurface {
                texture: MutableTexture::new(SCREEN_WIDTH, SCREEN_HEIGHT),
                entered: entered_sender,
            };
            let presenter = FramePresenter::new(buffer.clone(), surface).unwrap();
            let clock = RefreshClock::driving(Cadence::from_period(Duration::from_millis(1)), presenter);
            let bridge = DisplayBridge::new(EmulationDriver::new(Scribbler, buffer), clock);

            bridge.start().unwrap();
            bridge.view_did_appear().unwrap();
            entered.recv_timeout(Duration::from_secs(2)).unwrap();

            // Tear down from another thread while the present is in flight
            let teardown = thread::spawn(move || bridge.shutdown());
            teardown.join().unwrap();
            assert!(memory.upgrade().is_none());
        }
    }

    #[test]
    fn readback_clock_feeds_the_image_view() {
        let buffer = Arc::new(SharedFrameBuffer::new(BufferMode::Double));
        buffer.fill(0xff);
        buffer.publish();

        let (sink, mut view) = image_channel();
        let presenter = ReadbackPresenter::new(
            buffer.clone(),
            MutableTexture::new(SCREEN_WIDTH, SCREEN_HEIGHT),
            sink,
        )
        .unwrap();
        let clock = RefreshClock::driving(Cadence::from_period(Duration::from_millis(2)), presenter);
        clock.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while view.refresh().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        clock.stop();
        let image = view.image().unwrap();
        assert_eq!(image.pixel(0, 0), Some([0xff; 4]));
        assert_eq!(image.pixel(319, 239), Some([0xff; 4]));
    }
}
