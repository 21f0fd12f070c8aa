pub mod mock_polling;
pub mod mock_socketio;
